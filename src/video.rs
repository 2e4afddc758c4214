use log::trace;

use crate::{
    config::VideoTiming,
    consts::{BLANK_CYCLES, FRAME_SYNC_CYCLES, LINE_UPDATE_CYCLES},
    context::{Timing, VideoOut},
    grid::PixelGrid,
    interrupt::InterruptKind,
    util::trait_alias,
};

trait_alias!(pub trait Context = Timing + VideoOut);

/// Sources serviced during the low-power wait between lines. Only pixel
/// start ends the wait; frame sync runs inside it so the line index is reset
/// before the first line of the frame is painted.
pub const WAIT_SOURCES: [InterruptKind; 2] = [InterruptKind::PixelStart, InterruptKind::FrameSync];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LineState {
    pub line_index: u16,
    /// Toggled once per line; only lines with it set are painted.
    pub alternation: bool,
    pub visible: bool,
    pub output_enabled: bool,
}

/// Line counter and pixel dispatcher.
pub struct Video {
    config: VideoTiming,
    state: LineState,
    frame: u64,
}

impl Video {
    pub fn new(config: &VideoTiming) -> Video {
        Video {
            config: config.clone(),
            state: LineState::default(),
            frame: 0,
        }
    }

    pub fn reset(&mut self) {
        self.state = LineState::default();
        self.frame = 0;
    }

    pub fn state(&self) -> LineState {
        self.state
    }

    /// Frame-sync events handled since reset.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Grid row painted on `line`, if it is in the active display range.
    pub fn row_for_line(&self, line: u16) -> Option<usize> {
        if !self.config.is_visible(line) {
            return None;
        }
        Some(((line - self.config.first_visible_line) >> self.config.row_shift) as usize)
    }

    pub fn on_frame_sync(&mut self, ctx: &mut impl Context) {
        self.state.line_index = 0;
        self.update_flags();
        self.frame += 1;

        trace!("Frame {} at cycle {}", self.frame, ctx.now());
        ctx.elapse(FRAME_SYNC_CYCLES);
    }

    /// Runs at the end of the horizontal sync pulse. Paints the current line
    /// if it is enabled, then advances the line state for the next one.
    pub fn on_pixel_start(&mut self, ctx: &mut impl Context, grid: &PixelGrid) {
        if self.state.output_enabled {
            let cells = self
                .row_for_line(self.state.line_index)
                .and_then(|row| grid.row(row));

            if let Some(cells) = cells {
                for pixel in cells {
                    ctx.emit_pixel(pixel);
                    ctx.elapse(self.config.pixel_cycles as u64);
                }
                ctx.blank();
                ctx.elapse(BLANK_CYCLES);
            }
        }

        self.advance_line();
        ctx.elapse(LINE_UPDATE_CYCLES);
    }

    fn advance_line(&mut self) {
        self.state.line_index = self.state.line_index.wrapping_add(1);
        self.state.alternation = !self.state.alternation;
        self.update_flags();
    }

    fn update_flags(&mut self) {
        self.state.visible = self.config.is_visible(self.state.line_index);
        self.state.output_enabled = self.state.alternation && self.state.visible;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        consts::{END_VISIBLE_LINE, FIRST_VISIBLE_LINE, PIXEL_CYCLES, SCREEN_WIDTH},
        interface::{Pixel, PixelOut, SyncPulse},
    };

    #[derive(Default)]
    struct Bench {
        now: u64,
        out: Vec<(u64, PixelOut)>,
    }

    impl Timing for Bench {
        fn now(&self) -> u64 {
            self.now
        }

        fn elapse(&mut self, cycles: u64) {
            self.now += cycles;
        }
    }

    impl VideoOut for Bench {
        fn emit_pixel(&mut self, pixel: Pixel) {
            self.out.push((self.now, PixelOut::Pixel(pixel)));
        }

        fn blank(&mut self) {
            self.out.push((self.now, PixelOut::Blank));
        }

        fn set_sync(&mut self, _pulse: SyncPulse, _active: bool, _cycle: u64) {}
    }

    fn video() -> Video {
        Video::new(&VideoTiming::default())
    }

    /// Runs pixel handlers until the state reaches `line`.
    fn seek(v: &mut Video, b: &mut Bench, grid: &PixelGrid, line: u16) {
        while v.state().line_index != line {
            v.on_pixel_start(b, grid);
        }
    }

    #[test]
    fn invisible_lines_emit_nothing() {
        let grid = PixelGrid::new();
        let mut b = Bench::default();
        let mut v = video();

        for _ in 0..FIRST_VISIBLE_LINE {
            assert!(!v.state().visible);
            assert!(!v.state().output_enabled);
            v.on_pixel_start(&mut b, &grid);
        }
        assert!(b.out.is_empty());

        seek(&mut v, &mut b, &grid, END_VISIBLE_LINE);
        b.out.clear();
        for _ in END_VISIBLE_LINE..600 {
            assert!(!v.state().visible);
            v.on_pixel_start(&mut b, &grid);
        }
        assert!(b.out.is_empty());
    }

    #[test]
    fn row_mapping_is_shifted_and_monotonic() {
        let v = video();
        assert_eq!(v.row_for_line(34), None);
        assert_eq!(v.row_for_line(35), Some(0));
        assert_eq!(v.row_for_line(50), Some(0));
        assert_eq!(v.row_for_line(51), Some(1));
        assert_eq!(v.row_for_line(514), Some(29));
        assert_eq!(v.row_for_line(515), None);

        let mut prev = 0;
        for line in FIRST_VISIBLE_LINE..END_VISIBLE_LINE {
            let row = v.row_for_line(line).unwrap();
            assert_eq!(row, ((line - FIRST_VISIBLE_LINE) >> 4) as usize);
            assert!(row >= prev);
            prev = row;
        }
    }

    #[test]
    fn alternate_visible_lines_are_painted() {
        let grid = PixelGrid::new();
        let mut b = Bench::default();
        let mut v = video();

        let mut painted = 0;
        for _ in 0..520 {
            let s = v.state();
            assert_eq!(s.output_enabled, s.alternation && s.visible);
            if s.output_enabled {
                painted += 1;
            }
            v.on_pixel_start(&mut b, &grid);
        }
        assert_eq!(painted, 240);
    }

    #[test]
    fn frame_sync_resets_line_index() {
        let grid = PixelGrid::new();
        let mut b = Bench::default();
        let mut v = video();

        for line in [0, 1, 100, 519] {
            seek(&mut v, &mut b, &grid, line);
            v.on_frame_sync(&mut b);
            assert_eq!(v.state().line_index, 0);
            assert!(!v.state().visible);
            assert!(!v.state().output_enabled);

            v.on_frame_sync(&mut b);
            assert_eq!(v.state().line_index, 0);
        }
        assert_eq!(v.frame(), 8);
    }

    #[test]
    fn background_grid_emits_a_full_background_row() {
        let grid = PixelGrid::new();
        let mut b = Bench::default();
        let mut v = video();

        seek(&mut v, &mut b, &grid, 100);
        if !v.state().output_enabled {
            v.on_pixel_start(&mut b, &grid);
        }
        assert!(v.state().output_enabled);

        b.out.clear();
        v.on_pixel_start(&mut b, &grid);

        let pixels = b
            .out
            .iter()
            .filter(|(_, o)| matches!(o, PixelOut::Pixel(_)))
            .collect::<Vec<_>>();
        assert_eq!(pixels.len(), SCREEN_WIDTH);
        assert!(pixels
            .iter()
            .all(|(_, o)| *o == PixelOut::Pixel(Pixel::Background)));
        assert_eq!(b.out.last().map(|(_, o)| *o), Some(PixelOut::Blank));
    }

    #[test]
    fn pixels_are_evenly_spaced() {
        let grid = PixelGrid::new();
        grid.set(0, 0, Pixel::Active).unwrap();
        grid.set(0, 39, Pixel::Active).unwrap();

        let mut b = Bench::default();
        let mut v = video();
        seek(&mut v, &mut b, &grid, FIRST_VISIBLE_LINE);
        if !v.state().output_enabled {
            v.on_pixel_start(&mut b, &grid);
        }

        b.out.clear();
        let start = b.now;
        v.on_pixel_start(&mut b, &grid);

        for (i, (cycle, _)) in b.out.iter().enumerate() {
            assert_eq!(*cycle, start + i as u64 * PIXEL_CYCLES as u64);
        }
        assert_eq!(b.out[0].1, PixelOut::Pixel(Pixel::Active));
        assert_eq!(b.out[39].1, PixelOut::Pixel(Pixel::Active));
        assert_eq!(b.out[1].1, PixelOut::Pixel(Pixel::Background));
    }

    #[test]
    fn reset_is_idempotent() {
        let grid = PixelGrid::new();
        let mut b = Bench::default();
        let mut v = video();
        seek(&mut v, &mut b, &grid, 77);

        v.reset();
        let once = v.state();
        v.reset();
        assert_eq!(v.state(), once);
        assert_eq!(once, LineState::default());
        assert_eq!(v.frame(), 0);
    }
}
