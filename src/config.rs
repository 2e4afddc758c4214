use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    adc::AdcPrescaler,
    consts::*,
    timer::{ClockSelect, TimerSetup},
};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} timer clock {1:?} does not run from the CPU clock")]
    TimerNotClocked(&'static str, ClockSelect),
    #[error("{0} sync pulse of {1} ticks does not fit in a period of {2} ticks")]
    SyncPulseTooLong(&'static str, u16, u32),
    #[error("visible lines {0}..{1} are empty")]
    EmptyVisibleRange(u16, u16),
    #[error("visible lines end at {end} but a frame has only {lines} lines")]
    VisibleRangeBeyondFrame { end: u16, lines: u64 },
    #[error("visible lines map to {rows} rows, grid has {height}")]
    RowsBeyondGrid { rows: usize, height: usize },
    #[error("a painted row takes {needed} cycles, only {available} are left in the line")]
    RowTooLong { needed: u64, available: u64 },
    #[error("no converter prescaler gives {rate} Hz from a {cpu} Hz clock")]
    UnreachableSampleRate { rate: u32, cpu: u32 },
    #[error("sample window is empty")]
    EmptyWindow,
    #[error("maximum frequency {0} Hz does not fit the 16-bit estimate")]
    MaxFrequencyTooHigh(u32),
    #[error("converter range 0..={0} is not supported")]
    ConverterRange(u16),
    #[error("sample handler can be held off for {busy} cycles, conversions arrive every {period}")]
    SamplerStarved { busy: u64, period: u64 },
}

#[derive(Clone, Debug, PartialEq, Eq, JsonSchema, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// CPU clock in hertz; every timer and the converter divide this
    pub cpu_clock_hz: u32,
    pub video: VideoTiming,
    pub audio: AudioConfig,
}

#[derive(Clone, Debug, PartialEq, Eq, JsonSchema, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoTiming {
    /// Frame timer clock select
    pub frame_clock: ClockSelect,
    /// Frame timer counts 0..=frame_top
    pub frame_top: u16,
    /// Vertical sync width, in frame timer ticks
    pub vsync_ticks: u16,
    /// Line timer clock select
    pub line_clock: ClockSelect,
    /// Line timer counts 0..=line_top
    pub line_top: u16,
    /// Horizontal sync width in line timer ticks; pixels start when it ends
    pub hsync_ticks: u16,
    /// First line of the active display range
    pub first_visible_line: u16,
    /// One past the last line of the active display range
    pub end_visible_line: u16,
    /// log2 of physical lines per grid row
    pub row_shift: u8,
    /// CPU cycles each pixel is held
    pub pixel_cycles: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, JsonSchema, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Nominal conversion rate
    pub sample_rate_hz: u32,
    /// Samples per estimation window
    pub window_samples: u16,
    /// Estimates at or above this read as 0
    pub max_frequency_hz: u32,
    /// Largest converter code
    pub adc_max: u16,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            cpu_clock_hz: CPU_CLOCK_HZ,
            video: VideoTiming::default(),
            audio: AudioConfig::default(),
        }
    }
}

impl Default for VideoTiming {
    fn default() -> Self {
        VideoTiming {
            frame_clock: ClockSelect::Div1024,
            frame_top: FRAME_TOP,
            vsync_ticks: VSYNC_TICKS,
            line_clock: ClockSelect::Div8,
            line_top: LINE_TOP,
            hsync_ticks: HSYNC_TICKS,
            first_visible_line: FIRST_VISIBLE_LINE,
            end_visible_line: END_VISIBLE_LINE,
            row_shift: ROW_SHIFT,
            pixel_cycles: PIXEL_CYCLES,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        AudioConfig {
            sample_rate_hz: SAMPLE_RATE_HZ,
            window_samples: SAMPLE_WINDOW,
            max_frequency_hz: MAX_FREQUENCY_HZ,
            adc_max: ADC_MAX,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.video.validate()?;
        self.audio.validate(self.cpu_clock_hz)?;

        // A completion request raised right after line start waits out the
        // sync pulse and the pixel handler, then needs its own handler to
        // finish before the next result overwrites it.
        let period = self.audio.prescaler(self.cpu_clock_hz)?.conversion_cycles();
        let busy = self.video.hsync_cycles()?
            + self.video.row_handler_cycles()
            + INTERRUPT_ENTRY_CYCLES
            + FRAME_SYNC_CYCLES
            + INTERRUPT_RETURN_CYCLES
            + INTERRUPT_ENTRY_CYCLES
            + SAMPLE_CYCLES
            + WINDOW_CLOSE_CYCLES
            + INTERRUPT_RETURN_CYCLES;
        if busy >= period {
            return Err(ConfigError::SamplerStarved { busy, period });
        }

        Ok(())
    }
}

fn divisor(name: &'static str, clock: ClockSelect) -> Result<u64, ConfigError> {
    clock
        .divisor()
        .ok_or(ConfigError::TimerNotClocked(name, clock))
}

impl VideoTiming {
    pub fn frame_setup(&self) -> TimerSetup {
        TimerSetup {
            clock: self.frame_clock,
            top: self.frame_top,
            compare_b: self.vsync_ticks,
            sync_output: true,
        }
    }

    pub fn line_setup(&self) -> TimerSetup {
        TimerSetup {
            clock: self.line_clock,
            top: self.line_top,
            compare_b: self.hsync_ticks,
            sync_output: true,
        }
    }

    /// CPU cycles per frame and per line, if both timers are clocked.
    pub fn periods(&self) -> Result<(u64, u64), ConfigError> {
        let frame = divisor("frame", self.frame_clock)? * (self.frame_top as u64 + 1);
        let line = divisor("line", self.line_clock)? * (self.line_top as u64 + 1);
        Ok((frame, line))
    }

    pub fn lines_per_frame(&self) -> Result<u64, ConfigError> {
        let (frame, line) = self.periods()?;
        Ok(frame / line)
    }

    /// CPU cycles from line start to the end of the horizontal sync pulse.
    pub fn hsync_cycles(&self) -> Result<u64, ConfigError> {
        Ok(divisor("line", self.line_clock)? * self.hsync_ticks as u64)
    }

    /// CPU cycles of a pixel handler that paints a row, entry to return.
    pub fn row_handler_cycles(&self) -> u64 {
        INTERRUPT_ENTRY_CYCLES
            + SCREEN_WIDTH as u64 * self.pixel_cycles as u64
            + BLANK_CYCLES
            + LINE_UPDATE_CYCLES
            + INTERRUPT_RETURN_CYCLES
    }

    pub fn is_visible(&self, line: u16) -> bool {
        (self.first_visible_line..self.end_visible_line).contains(&line)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let (_, line_period) = self.periods()?;

        if self.vsync_ticks == 0 || self.vsync_ticks > self.frame_top {
            return Err(ConfigError::SyncPulseTooLong(
                "vertical",
                self.vsync_ticks,
                self.frame_top as u32 + 1,
            ));
        }
        if self.hsync_ticks == 0 || self.hsync_ticks > self.line_top {
            return Err(ConfigError::SyncPulseTooLong(
                "horizontal",
                self.hsync_ticks,
                self.line_top as u32 + 1,
            ));
        }

        if self.first_visible_line >= self.end_visible_line {
            return Err(ConfigError::EmptyVisibleRange(
                self.first_visible_line,
                self.end_visible_line,
            ));
        }

        let lines = self.lines_per_frame()?;
        if self.end_visible_line as u64 > lines {
            return Err(ConfigError::VisibleRangeBeyondFrame {
                end: self.end_visible_line,
                lines,
            });
        }

        let span = (self.end_visible_line - 1 - self.first_visible_line) as usize;
        let rows = span.checked_shr(self.row_shift as u32).unwrap_or(0) + 1;
        if rows > SCREEN_HEIGHT {
            return Err(ConfigError::RowsBeyondGrid {
                rows,
                height: SCREEN_HEIGHT,
            });
        }

        let available = line_period - self.hsync_cycles()?;
        let needed = self.row_handler_cycles();
        if needed > available {
            return Err(ConfigError::RowTooLong { needed, available });
        }

        Ok(())
    }
}

impl AudioConfig {
    /// Code that maps to zero after centering.
    pub fn midpoint(&self) -> i16 {
        ((self.adc_max as u32 + 1) / 2) as i16
    }

    pub fn validate(&self, cpu_clock_hz: u32) -> Result<(), ConfigError> {
        if self.adc_max == 0 || self.adc_max > i16::MAX as u16 {
            return Err(ConfigError::ConverterRange(self.adc_max));
        }
        if self.window_samples == 0 {
            return Err(ConfigError::EmptyWindow);
        }
        if self.max_frequency_hz > u16::MAX as u32 + 1 {
            return Err(ConfigError::MaxFrequencyTooHigh(self.max_frequency_hz));
        }
        self.prescaler(cpu_clock_hz)?;
        Ok(())
    }

    pub fn prescaler(&self, cpu_clock_hz: u32) -> Result<AdcPrescaler, ConfigError> {
        AdcPrescaler::for_rate(cpu_clock_hz, self.sample_rate_hz).ok_or(
            ConfigError::UnreachableSampleRate {
                rate: self.sample_rate_hz,
                cpu: cpu_clock_hz,
            },
        )
    }
}
