//! Per-buffer table of projection rectangles.

use crate::command::{Command, CommandBuffer, MAX_SCREENS, Screen};

/// Column-major 4×4 matrix as uploaded to the GPU.
pub type Mat4 = [[f32; 4]; 4];

/// Distinct screen rectangles of one buffer, in first-use order.
///
/// A rectangle is only compared with the entry before it, so alternating
/// between two rectangles adds an entry per switch.
#[derive(Debug, Default)]
pub struct ScreenTable {
    screens: Vec<Screen>,
    /// Table index of each render command, in command order.
    render_indices: Vec<u32>,
    overflowed: bool,
}

impl ScreenTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the table from the render commands of `buffer`.
    pub fn rebuild(&mut self, buffer: &CommandBuffer) {
        self.screens.clear();
        self.render_indices.clear();
        self.overflowed = false;

        for cmd in buffer.commands() {
            let Command::Render(render) = cmd else {
                continue;
            };
            let screen = render.state.screen;
            if self.screens.last() != Some(&screen) {
                if self.screens.len() < MAX_SCREENS {
                    self.screens.push(screen);
                } else if !self.overflowed {
                    self.overflowed = true;
                    log::warn!("more than {MAX_SCREENS} screen rectangles in one buffer; reusing the last");
                }
            }
            self.render_indices.push(self.screens.len().saturating_sub(1) as u32);
        }
    }

    /// Table index for the `ordinal`-th render command of the buffer.
    pub fn index_for(&self, ordinal: usize) -> u32 {
        self.render_indices.get(ordinal).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.screens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.screens.is_empty()
    }

    pub fn matrices(&self) -> Vec<Mat4> {
        self.screens.iter().map(ortho).collect()
    }
}

/// Maps `(x0, y0)` to the top-left and `(x1, y1)` to the bottom-right of clip
/// space.
pub fn ortho(screen: &Screen) -> Mat4 {
    let Screen { x0, y0, x1, y1 } = *screen;
    let w = x1 - x0;
    let h = y0 - y1;
    [
        [2.0 / w, 0.0, 0.0, 0.0],
        [0.0, 2.0 / h, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [-(x1 + x0) / w, -(y0 + y1) / h, 0.0, 1.0],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{PrimType, RenderCommand, RenderState};

    fn render(screen: Screen) -> Command {
        Command::Render(RenderCommand {
            state: RenderState {
                screen,
                ..Default::default()
            },
            prim_type: PrimType::Quads,
            prim_count: 1,
            vertex_offset: 0,
        })
    }

    fn buffer(screens: &[Screen]) -> CommandBuffer {
        let mut buf = CommandBuffer::new(1 << 20, 0);
        for &s in screens {
            buf.add_command(render(s)).unwrap();
            buf.add_command(Command::Nop).unwrap();
        }
        buf
    }

    fn apply(m: &Mat4, x: f32, y: f32) -> (f32, f32) {
        (
            m[0][0] * x + m[1][0] * y + m[3][0],
            m[0][1] * x + m[1][1] * y + m[3][1],
        )
    }

    // ── dedup ─────────────────────────────────────────────────────────────

    #[test]
    fn default_state_projects_to_finite_values() {
        let m = ortho(&RenderState::default().screen);
        assert!(m.as_flattened().iter().all(|v| v.is_finite()));
        assert_eq!(apply(&m, 0.0, 0.0), (-1.0, 1.0));
        assert_eq!(apply(&m, 1.0, 1.0), (1.0, -1.0));
    }

    #[test]
    fn identical_screens_share_one_entry() {
        let s = Screen::new(0.0, 0.0, 800.0, 600.0);
        let mut table = ScreenTable::new();
        table.rebuild(&buffer(&[s; 50]));
        assert_eq!(table.len(), 1);
        assert_eq!(table.matrices().len(), 1);
        assert!((0..50).all(|i| table.index_for(i) == 0));
    }

    #[test]
    fn dedup_only_looks_at_previous_entry() {
        let a = Screen::new(0.0, 0.0, 10.0, 10.0);
        let b = Screen::new(0.0, 0.0, 20.0, 20.0);
        let mut table = ScreenTable::new();
        table.rebuild(&buffer(&[a, b, a, a]));
        assert_eq!(table.len(), 3);
        assert_eq!((0..4).map(|i| table.index_for(i)).collect::<Vec<_>>(), [0, 1, 2, 2]);
    }

    #[test]
    fn rebuild_starts_from_empty() {
        let mut table = ScreenTable::new();
        table.rebuild(&buffer(&[Screen::new(0.0, 0.0, 1.0, 1.0)]));
        table.rebuild(&buffer(&[]));
        assert!(table.is_empty());
    }

    #[test]
    fn overflow_reuses_last_entry() {
        let screens: Vec<_> = (0..MAX_SCREENS + 3)
            .map(|i| Screen::new(0.0, 0.0, i as f32 + 1.0, 1.0))
            .collect();
        let mut table = ScreenTable::new();
        table.rebuild(&buffer(&screens));
        assert_eq!(table.len(), MAX_SCREENS);
        assert_eq!(table.index_for(MAX_SCREENS + 2), MAX_SCREENS as u32 - 1);
    }

    // ── projection ────────────────────────────────────────────────────────

    #[test]
    fn ortho_maps_corners_to_clip_space() {
        let m = ortho(&Screen::new(64.0, 32.0, 320.0, 288.0));
        assert_eq!(apply(&m, 64.0, 32.0), (-1.0, 1.0));
        assert_eq!(apply(&m, 320.0, 288.0), (1.0, -1.0));
        assert_eq!(apply(&m, 192.0, 160.0), (0.0, 0.0));
    }
}
