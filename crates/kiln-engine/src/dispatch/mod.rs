//! Routes each command to the fragment that owns its code.
//!
//! Fragments are tried in a fixed order: general, GPU, then platform when
//! present. A command no fragment claims is logged and skipped.

mod general;
mod gpu;
mod platform;

pub use general::GeneralFragment;
pub use gpu::GpuFragment;
pub use platform::PlatformFragment;

use crate::backend::GpuBackend;
use crate::command::{Command, CommandBuffer, Vertex};
use crate::threaded::BufferProcessor;

/// Fragment chain bound to one backend.
pub struct CommandProcessor<B> {
    general: GeneralFragment,
    gpu: GpuFragment<B>,
    platform: Option<PlatformFragment>,
    unhandled: usize,
}

impl<B: GpuBackend> CommandProcessor<B> {
    /// A processor without window-system commands.
    pub fn new(backend: B) -> Self {
        Self {
            general: GeneralFragment,
            gpu: GpuFragment::new(backend),
            platform: None,
            unhandled: 0,
        }
    }

    pub fn with_platform(backend: B) -> Self {
        Self {
            platform: Some(PlatformFragment),
            ..Self::new(backend)
        }
    }

    pub fn backend(&self) -> &B {
        self.gpu.backend()
    }

    /// Commands skipped because no fragment claimed them.
    pub fn unhandled(&self) -> usize {
        self.unhandled
    }

    pub fn run_command(&mut self, cmd: &mut Command, vertices: &[Vertex]) -> bool {
        if self.general.run_command(cmd) {
            return true;
        }
        if self.gpu.run_command(cmd, vertices) {
            return true;
        }
        match &mut self.platform {
            Some(platform) => platform.run_command(cmd, &mut self.gpu),
            None => false,
        }
    }
}

impl<B: GpuBackend> BufferProcessor for CommandProcessor<B> {
    fn run_buffer(&mut self, buffer: &mut CommandBuffer) {
        self.gpu.begin_buffer(buffer);

        let (commands, vertices) = buffer.parts_mut();
        for cmd in commands.iter_mut() {
            if !self.run_command(cmd, vertices) {
                self.unhandled += 1;
                log::warn!("unknown command {} ({})", cmd.code(), cmd.name());
            }
        }

        self.gpu.end_buffer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{
        codes, BackendInit, ClearCommand, Image, PrimType, RenderCommand, RenderState,
        ResizeCommand, Screen, ScreenshotCommand, Semaphore, SignalCommand, SwapCommand,
        TextureCreateCommand, TextureDestroyCommand, TextureUpdateCommand, VSyncCommand,
    };
    use crate::coords::{ClipRect, ColorRgba};
    use crate::screen::Mat4;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Upload { vertices: usize, transforms: usize },
        Clear,
        Render { transform: u32 },
        Present,
        SetVsync(bool),
        BeginFrame,
        Resize(u32, u32),
        Shutdown,
        EndBuffer,
    }

    struct Recording {
        ready: bool,
        events: Vec<Event>,
    }

    impl Recording {
        fn new() -> Self {
            Self {
                ready: true,
                events: Vec::new(),
            }
        }
    }

    impl GpuBackend for Recording {
        type Init = ();
        const INIT_CODE: u32 = codes::WGPU_INIT;

        fn unpack_init(_: BackendInit) -> Option<()> {
            Some(())
        }
        fn init(&mut self, _: ()) {
            self.ready = true;
        }
        fn is_ready(&self) -> bool {
            self.ready
        }
        fn begin_buffer(&mut self, vertices: &[Vertex], transforms: &[Mat4]) {
            self.events.push(Event::Upload {
                vertices: vertices.len(),
                transforms: transforms.len(),
            });
        }
        fn end_buffer(&mut self) {
            self.events.push(Event::EndBuffer);
        }
        fn texture_create(&mut self, _: &TextureCreateCommand) {}
        fn texture_update(&mut self, _: &TextureUpdateCommand) {}
        fn texture_destroy(&mut self, _: &TextureDestroyCommand) {}
        fn clear(&mut self, _: ColorRgba) {
            self.events.push(Event::Clear);
        }
        fn render(&mut self, _: &RenderCommand, transform: u32) {
            self.events.push(Event::Render { transform });
        }
        fn present(&mut self, _: bool) {
            self.events.push(Event::Present);
        }
        fn set_vsync(&mut self, vsync: bool) {
            self.events.push(Event::SetVsync(vsync));
        }
        fn begin_frame(&mut self) {
            self.events.push(Event::BeginFrame);
        }
        fn screenshot(&mut self, region: Option<ClipRect>) -> Option<Image> {
            let (width, height) = region.map_or((1, 1), |r| (r.w, r.h));
            Some(Image {
                width,
                height,
                data: vec![1, 2, 3],
            })
        }
        fn resize(&mut self, width: u32, height: u32) {
            self.events.push(Event::Resize(width, height));
        }
        fn shutdown(&mut self) {
            self.ready = false;
            self.events.push(Event::Shutdown);
        }
    }

    fn buffer(commands: Vec<Command>) -> CommandBuffer {
        let mut buf = CommandBuffer::new(1 << 20, 1 << 16);
        buf.add_vertices(&[Vertex::default(); 8]).unwrap();
        for c in commands {
            buf.add_command(c).unwrap();
        }
        buf
    }

    fn render(screen: Screen) -> Command {
        Command::Render(RenderCommand {
            state: RenderState {
                screen,
                ..Default::default()
            },
            prim_type: PrimType::Quads,
            prim_count: 2,
            vertex_offset: 0,
        })
    }

    fn swap() -> Command {
        Command::Swap(SwapCommand { finish: false })
    }

    fn position(events: &[Event], e: &Event) -> usize {
        events.iter().position(|x| x == e).unwrap()
    }

    // ── chain ─────────────────────────────────────────────────────────────

    #[test]
    fn unknown_command_is_skipped_once() {
        let mut p = CommandProcessor::new(Recording::new());
        let mut buf = buffer(vec![
            Command::Clear(ClearCommand { color: ColorRgba::black() }),
            Command::VSync(VSyncCommand { vsync: false }),
            swap(),
        ]);
        p.run_buffer(&mut buf);

        assert_eq!(p.unhandled(), 1);
        assert_eq!(
            p.backend().events,
            vec![Event::Clear, Event::Present, Event::BeginFrame, Event::EndBuffer]
        );
    }

    #[test]
    fn signal_raises_the_semaphore() {
        let sem = Semaphore::new();
        let mut p = CommandProcessor::new(Recording::new());
        let mut buf = buffer(vec![Command::Signal(SignalCommand { semaphore: sem.clone() })]);
        p.run_buffer(&mut buf);
        assert!(sem.try_wait());
        assert_eq!(p.unhandled(), 0);
    }

    // ── uploads ───────────────────────────────────────────────────────────

    #[test]
    fn one_upload_for_identical_screens() {
        let s = Screen::new(0.0, 0.0, 640.0, 480.0);
        let mut p = CommandProcessor::new(Recording::new());
        let mut buf = buffer((0..20).map(|_| render(s)).collect());
        p.run_buffer(&mut buf);

        let events = &p.backend().events;
        let uploads: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, Event::Upload { .. }))
            .collect();
        assert_eq!(uploads, [&Event::Upload { vertices: 8, transforms: 1 }]);
        assert_eq!(events[0], Event::Upload { vertices: 8, transforms: 1 });
        assert!(events
            .iter()
            .filter(|e| matches!(e, Event::Render { .. }))
            .all(|e| *e == Event::Render { transform: 0 }));
    }

    #[test]
    fn renders_reference_their_table_entry() {
        let a = Screen::new(0.0, 0.0, 1.0, 1.0);
        let b = Screen::new(0.0, 0.0, 2.0, 2.0);
        let mut p = CommandProcessor::new(Recording::new());
        let mut buf = buffer(vec![render(a), render(b), render(b), render(a)]);
        p.run_buffer(&mut buf);

        let transforms: Vec<u32> = p
            .backend()
            .events
            .iter()
            .filter_map(|e| match e {
                Event::Render { transform } => Some(*transform),
                _ => None,
            })
            .collect();
        assert_eq!(transforms, [0, 1, 1, 2]);
    }

    #[test]
    fn buffer_without_draws_uploads_nothing() {
        let mut p = CommandProcessor::new(Recording::new());
        let mut buf = buffer(vec![swap()]);
        p.run_buffer(&mut buf);
        assert!(!p.backend().events.iter().any(|e| matches!(e, Event::Upload { .. })));
    }

    // ── platform ──────────────────────────────────────────────────────────

    #[test]
    fn vsync_change_waits_for_the_swap() {
        let mut p = CommandProcessor::with_platform(Recording::new());
        let mut buf = buffer(vec![
            Command::VSync(VSyncCommand { vsync: false }),
            Command::Clear(ClearCommand { color: ColorRgba::white() }),
            swap(),
        ]);
        p.run_buffer(&mut buf);

        let events = &p.backend().events;
        let present = position(events, &Event::Present);
        let recreate = position(events, &Event::SetVsync(false));
        let acquire = position(events, &Event::BeginFrame);
        assert!(position(events, &Event::Clear) < present);
        assert!(present < recreate && recreate < acquire);
        assert_eq!(p.unhandled(), 0);
    }

    #[test]
    fn vsync_without_swap_stays_pending() {
        let mut p = CommandProcessor::with_platform(Recording::new());
        let mut first = buffer(vec![Command::VSync(VSyncCommand { vsync: true })]);
        p.run_buffer(&mut first);
        assert!(!p.backend().events.contains(&Event::SetVsync(true)));

        let mut second = buffer(vec![swap()]);
        p.run_buffer(&mut second);
        assert!(p.backend().events.contains(&Event::SetVsync(true)));
    }

    #[test]
    fn shutdown_makes_draws_no_ops() {
        let mut p = CommandProcessor::with_platform(Recording::new());
        let mut buf = buffer(vec![
            Command::Resize(ResizeCommand { width: 320, height: 200 }),
            Command::Shutdown,
            render(Screen::default()),
            swap(),
        ]);
        p.run_buffer(&mut buf);
        assert_eq!(
            p.backend().events,
            vec![Event::Resize(320, 200), Event::Shutdown]
        );
        assert_eq!(p.unhandled(), 0);
    }

    #[test]
    fn screenshot_replies_on_its_channel() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let mut p = CommandProcessor::new(Recording::new());
        let mut buf = buffer(vec![Command::Screenshot(ScreenshotCommand {
            region: None,
            reply: tx,
        })]);
        p.run_buffer(&mut buf);
        assert_eq!(rx.try_recv().unwrap().data, vec![1, 2, 3]);
    }

    #[test]
    fn screenshot_region_reaches_the_backend() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let mut p = CommandProcessor::new(Recording::new());
        let mut buf = buffer(vec![Command::Screenshot(ScreenshotCommand {
            region: Some(ClipRect::new(4, 8, 16, 2)),
            reply: tx,
        })]);
        p.run_buffer(&mut buf);
        let image = rx.try_recv().unwrap();
        assert_eq!((image.width, image.height), (16, 2));
    }
}
