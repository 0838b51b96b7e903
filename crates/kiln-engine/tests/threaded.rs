//! Drives the render thread end to end with a backend that records calls.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use kiln_engine::backend::GpuBackend;
use kiln_engine::command::{
    BackendInit, ClearCommand, Command, CommandBuffer, Image, PrimType, RenderCommand,
    RenderState, Screen, ScreenshotCommand, Semaphore, SignalCommand, SwapCommand,
    TextureCreateCommand, TextureDestroyCommand, TextureUpdateCommand, VSyncCommand, Vertex,
    codes,
};
use kiln_engine::coords::{ClipRect, ColorRgba};
use kiln_engine::dispatch::CommandProcessor;
use kiln_engine::screen::Mat4;
use kiln_engine::threaded::ThreadedBackend;

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Upload(usize),
    Clear,
    Render,
    Present,
    SetVsync(bool),
    Shutdown,
}

type Log = Arc<Mutex<Vec<Call>>>;

struct Recording {
    log: Log,
    ready: bool,
}

impl Recording {
    fn push(&self, call: Call) {
        self.log.lock().unwrap().push(call);
    }
}

impl GpuBackend for Recording {
    type Init = ();
    const INIT_CODE: u32 = codes::WGPU_INIT;

    fn unpack_init(_: BackendInit) -> Option<()> {
        None
    }
    fn init(&mut self, _: ()) {}
    fn is_ready(&self) -> bool {
        self.ready
    }
    fn begin_buffer(&mut self, vertices: &[Vertex], _: &[Mat4]) {
        self.push(Call::Upload(vertices.len()));
    }
    fn end_buffer(&mut self) {}
    fn texture_create(&mut self, _: &TextureCreateCommand) {}
    fn texture_update(&mut self, _: &TextureUpdateCommand) {}
    fn texture_destroy(&mut self, _: &TextureDestroyCommand) {}
    fn clear(&mut self, _: ColorRgba) {
        self.push(Call::Clear);
    }
    fn render(&mut self, _: &RenderCommand, _: u32) {
        // Slow enough that the producer observes a busy worker.
        std::thread::sleep(Duration::from_millis(5));
        self.push(Call::Render);
    }
    fn present(&mut self, _: bool) {
        self.push(Call::Present);
    }
    fn set_vsync(&mut self, vsync: bool) {
        self.push(Call::SetVsync(vsync));
    }
    fn begin_frame(&mut self) {}
    fn screenshot(&mut self, _region: Option<ClipRect>) -> Option<Image> {
        Some(Image {
            width: 2,
            height: 1,
            data: vec![10, 20, 30, 40, 50, 60],
        })
    }
    fn resize(&mut self, _: u32, _: u32) {}
    fn shutdown(&mut self) {
        self.ready = false;
        self.push(Call::Shutdown);
    }
}

fn start() -> (ThreadedBackend, Log) {
    let log = Log::default();
    let backend_log = Arc::clone(&log);
    let threaded = ThreadedBackend::start(move || {
        CommandProcessor::with_platform(Recording {
            log: backend_log,
            ready: true,
        })
    })
    .unwrap();
    (threaded, log)
}

fn new_buffer() -> CommandBuffer {
    CommandBuffer::new(64 * 1024, 64 * 1024)
}

fn draw(buf: &mut CommandBuffer) {
    let offset = buf.add_vertices(&[Vertex::default(); 4]).unwrap();
    buf.add_command(Command::Render(RenderCommand {
        state: RenderState {
            screen: Screen::new(0.0, 0.0, 100.0, 100.0),
            ..Default::default()
        },
        prim_type: PrimType::Quads,
        prim_count: 1,
        vertex_offset: offset,
    }))
    .unwrap();
}

fn swap(buf: &mut CommandBuffer) {
    buf.add_command(Command::Swap(SwapCommand { finish: false }))
        .unwrap();
}

// ── hand-off ──────────────────────────────────────────────────────────────

#[test]
fn frames_execute_in_submission_order() {
    let (mut threaded, log) = start();

    for _ in 0..3 {
        let mut buf = new_buffer();
        buf.add_command(Command::Clear(ClearCommand {
            color: ColorRgba::black(),
        }))
        .unwrap();
        draw(&mut buf);
        swap(&mut buf);
        threaded.run_buffer(buf);
    }
    threaded.wait_for_idle();
    assert!(threaded.is_idle());

    let frame = [Call::Clear, Call::Upload(4), Call::Render, Call::Present];
    let expected: Vec<Call> = frame.iter().cycle().take(12).cloned().collect();
    assert_eq!(*log.lock().unwrap(), expected);
}

#[test]
fn drained_buffer_is_returned_empty() {
    let (mut threaded, _log) = start();

    let mut first = new_buffer();
    draw(&mut first);
    assert!(threaded.run_buffer(first).is_none());

    let mut second = new_buffer();
    draw(&mut second);
    let recycled = threaded.run_buffer(second).expect("first buffer back");
    assert!(recycled.is_empty());
    assert_eq!(recycled.vertex_data().len(), 0);
}

#[test]
fn busy_while_buffer_in_flight() {
    let (mut threaded, _log) = start();

    let mut buf = new_buffer();
    for _ in 0..20 {
        draw(&mut buf);
    }
    threaded.run_buffer(buf);
    assert!(!threaded.is_idle());
    threaded.wait_for_idle();
    assert!(threaded.is_idle());
}

// ── producer synchronization ──────────────────────────────────────────────

#[test]
fn signal_is_raised_mid_buffer() {
    let (mut threaded, log) = start();
    let sem = Semaphore::new();

    let mut buf = new_buffer();
    draw(&mut buf);
    buf.add_command(Command::Signal(SignalCommand {
        semaphore: sem.clone(),
    }))
    .unwrap();
    for _ in 0..10 {
        draw(&mut buf);
    }
    threaded.run_buffer(buf);

    assert!(sem.wait_timeout(Duration::from_secs(5)));
    let renders_at_signal = log
        .lock()
        .unwrap()
        .iter()
        .filter(|c| **c == Call::Render)
        .count();
    assert!(renders_at_signal < 11);

    threaded.wait_for_idle();
}

#[test]
fn screenshot_reply_arrives_after_idle() {
    let (mut threaded, _log) = start();
    let (tx, rx) = crossbeam_channel::bounded(1);

    let mut buf = new_buffer();
    buf.add_command(Command::Screenshot(ScreenshotCommand {
        region: None,
        reply: tx,
    }))
    .unwrap();
    threaded.run_buffer(buf);
    threaded.wait_for_idle();

    let image = rx.try_recv().expect("screenshot");
    assert_eq!((image.width, image.height), (2, 1));
    assert_eq!(image.data.len(), 6);
}

// ── platform commands ─────────────────────────────────────────────────────

#[test]
fn vsync_change_waits_for_swap_in_later_buffer() {
    let (mut threaded, log) = start();

    let mut buf = new_buffer();
    buf.add_command(Command::VSync(VSyncCommand { vsync: false }))
        .unwrap();
    draw(&mut buf);
    threaded.run_buffer(buf);
    threaded.wait_for_idle();
    assert!(!log.lock().unwrap().contains(&Call::SetVsync(false)));

    let mut buf = new_buffer();
    swap(&mut buf);
    threaded.run_buffer(buf);
    threaded.wait_for_idle();

    let calls = log.lock().unwrap();
    let present = calls.iter().position(|c| *c == Call::Present).unwrap();
    assert_eq!(calls[present + 1], Call::SetVsync(false));
}

#[test]
fn shutdown_then_stop() {
    let (mut threaded, log) = start();

    let mut buf = new_buffer();
    buf.add_command(Command::Shutdown).unwrap();
    draw(&mut buf);
    swap(&mut buf);
    threaded.run_buffer(buf);
    threaded.stop();

    assert_eq!(*log.lock().unwrap(), vec![Call::Shutdown]);
}
