pub const CPU_CLOCK_HZ: u32 = 16_000_000;

pub const SCREEN_WIDTH: usize = 40;
pub const SCREEN_HEIGHT: usize = 30;

// Frame timer: 1024 * 260 = 266240 cycles per frame
pub const FRAME_TOP: u16 = 259;
pub const VSYNC_TICKS: u16 = 1;

// Line timer: 8 * 64 = 512 cycles per line
pub const LINE_TOP: u16 = 63;
pub const HSYNC_TICKS: u16 = 7;

pub const FIRST_VISIBLE_LINE: u16 = 35;
pub const END_VISIBLE_LINE: u16 = 515;
pub const ROW_SHIFT: u8 = 4;
pub const PIXEL_CYCLES: u32 = 8;

// One conversion takes 13 converter clocks: 16 MHz / 128 / 13
pub const CONVERSION_CLOCKS: u64 = 13;
pub const SAMPLE_RATE_HZ: u32 = 9_615;
pub const SAMPLE_WINDOW: u16 = 1024;
pub const MAX_FREQUENCY_HZ: u32 = 10_000;
pub const ADC_MAX: u16 = 1023;

// Modelled handler costs, in CPU cycles
pub const INTERRUPT_ENTRY_CYCLES: u64 = 4;
pub const INTERRUPT_RETURN_CYCLES: u64 = 4;
pub const FRAME_SYNC_CYCLES: u64 = 4;
pub const LINE_UPDATE_CYCLES: u64 = 12;
pub const BLANK_CYCLES: u64 = 4;
pub const SAMPLE_CYCLES: u64 = 20;
pub const WINDOW_CLOSE_CYCLES: u64 = 48;
