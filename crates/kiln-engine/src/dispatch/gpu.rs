use crate::backend::GpuBackend;
use crate::command::{Command, CommandBuffer, Vertex};
use crate::screen::ScreenTable;

/// Resource, draw and presentation commands, executed against `B`.
pub struct GpuFragment<B> {
    backend: B,
    screens: ScreenTable,
    /// Render commands seen so far in the current buffer.
    render_ordinal: usize,
    uploaded: bool,
    /// Swap interval to apply after the next present.
    pending_vsync: Option<bool>,
}

impl<B: GpuBackend> GpuFragment<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            screens: ScreenTable::new(),
            render_ordinal: 0,
            uploaded: false,
            pending_vsync: None,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn begin_buffer(&mut self, buffer: &CommandBuffer) {
        self.screens.rebuild(buffer);
        self.render_ordinal = 0;
        self.uploaded = false;
    }

    pub fn end_buffer(&mut self) {
        if self.backend.is_ready() {
            self.backend.end_buffer();
        }
    }

    /// Uploads vertex data and transforms once per buffer, before the first
    /// draw.
    fn ensure_uploaded(&mut self, vertices: &[Vertex]) {
        if self.uploaded {
            return;
        }
        self.uploaded = true;
        self.backend.begin_buffer(vertices, &self.screens.matrices());
    }

    /// Defers a swap-interval change to the next swap.
    pub fn request_vsync(&mut self, vsync: bool) {
        log::debug!("vsync change to {vsync} requested");
        self.pending_vsync = Some(vsync);
    }

    pub fn pending_vsync(&self) -> Option<bool> {
        self.pending_vsync
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if self.backend.is_ready() {
            self.backend.resize(width, height);
        }
    }

    pub fn shutdown(&mut self) {
        self.pending_vsync = None;
        self.backend.shutdown();
    }

    pub fn run_command(&mut self, cmd: &mut Command, vertices: &[Vertex]) -> bool {
        let code = cmd.code();
        let ready = self.backend.is_ready();

        match cmd {
            Command::Init(_) if code == B::INIT_CODE => {
                if let Command::Init(init) = std::mem::replace(cmd, Command::Nop) {
                    match B::unpack_init(init) {
                        Some(init) => self.backend.init(init),
                        None => log::warn!("init command {code} has no payload for this backend"),
                    }
                }
            }
            Command::TextureCreate(c) if ready => self.backend.texture_create(c),
            Command::TextureUpdate(c) if ready => self.backend.texture_update(c),
            Command::TextureDestroy(c) if ready => self.backend.texture_destroy(c),
            Command::Clear(c) if ready => self.backend.clear(c.color),
            Command::Render(c) => {
                let ordinal = self.render_ordinal;
                self.render_ordinal += 1;
                if ready {
                    let c = *c;
                    self.ensure_uploaded(vertices);
                    self.backend.render(&c, self.screens.index_for(ordinal));
                }
            }
            Command::Swap(c) if ready => {
                let finish = c.finish;
                self.backend.present(finish);
                if let Some(vsync) = self.pending_vsync.take() {
                    self.backend.set_vsync(vsync);
                }
                self.backend.begin_frame();
            }
            Command::Screenshot(c) if ready => {
                if let Some(image) = self.backend.screenshot(c.region) {
                    let _ = c.reply.send(image);
                }
            }
            Command::TextureCreate(_)
            | Command::TextureUpdate(_)
            | Command::TextureDestroy(_)
            | Command::Clear(_)
            | Command::Swap(_)
            | Command::Screenshot(_) => {
                log::trace!("backend not ready; skipping {}", cmd.name());
            }
            _ => return false,
        }
        true
    }
}
