mod adc;
mod audio;
mod config;
mod consts;
mod context;
mod grid;
mod interface;
mod interrupt;
mod pitch;
mod timer;
mod util;
mod video;

use log::info;

use adc::{AdcControl, AdcPrescaler};
use consts::{INTERRUPT_ENTRY_CYCLES, INTERRUPT_RETURN_CYCLES};
use context::{Context, Interrupt, Timing};
use interrupt::InterruptKind;
use video::WAIT_SOURCES;

pub use audio::WindowProgress;
pub use config::{AudioConfig, Config, ConfigError, VideoTiming};
pub use consts::{SCREEN_HEIGHT, SCREEN_WIDTH};
pub use grid::{GridError, PixelGrid};
pub use interface::{
    AnalogSource, Constant, Pixel, PixelEvent, PixelOut, SignalTrace, SineWave, SquareWave,
    SyncEdge, SyncPulse,
};
pub use pitch::estimate_frequency_hz;
pub use timer::ClockSelect;
pub use video::LineState;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// The simulated device, advanced cycle by cycle.
pub struct Board {
    ctx: Context,
    config: Config,
    prescaler: AdcPrescaler,
    frame_period: u64,
    sleeping: bool,
}

impl Board {
    pub fn new(config: Config, input: impl AnalogSource + 'static) -> Result<Board, Error> {
        config.validate()?;

        let prescaler = config.audio.prescaler(config.cpu_clock_hz)?;
        let (frame_period, _) = config.video.periods()?;
        let ctx = Context::new(&config, Box::new(input));

        Ok(Board {
            ctx,
            config,
            prescaler,
            frame_period,
            sleeping: false,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Clear the grid and start the frame and line timers.
    pub fn initialize_video(&mut self) {
        let video = &self.config.video;
        let frame = video.frame_setup();
        let line = video.line_setup();

        self.ctx.critical_section(|ctx| {
            ctx.grid.clear();
            ctx.video.reset();

            let inner = &mut ctx.inner;
            inner.timers.frame.configure(&mut inner.inner, &frame);
            inner.timers.line.configure(&mut inner.inner, &line);

            let int = ctx.interrupt_mut();
            int.ack(InterruptKind::FrameSync);
            int.ack(InterruptKind::LineStart);
            int.ack(InterruptKind::PixelStart);
            int.enable_source(InterruptKind::FrameSync, true);
            int.enable_source(InterruptKind::LineStart, true);
            int.enable_source(InterruptKind::PixelStart, true);
        });
        self.sleeping = false;
        self.ctx.interrupt_mut().set_master_enable(true);

        if let Ok((_, line_period)) = video.periods() {
            info!(
                "Video started: {} lines of {line_period} cycles, visible {}..{}",
                self.frame_period / line_period,
                video.first_visible_line,
                video.end_visible_line
            );
        }
    }

    /// Start the converter free-running at the configured sample rate.
    pub fn initialize_audio(&mut self) {
        let control = AdcControl::new()
            .with_prescaler(self.prescaler)
            .with_interrupt_enable(true)
            .with_auto_trigger(true)
            .with_start(true)
            .with_enable(true);

        self.ctx.critical_section(|ctx| {
            ctx.audio.reset();
            ctx.frequency.reset();

            let inner = &mut ctx.inner;
            inner.adc.write_control(&mut inner.inner, control);

            let int = ctx.interrupt_mut();
            int.ack(InterruptKind::AdcComplete);
            int.enable_source(InterruptKind::AdcComplete, true);
        });
        self.ctx.interrupt_mut().set_master_enable(true);

        let audio = &self.config.audio;
        info!(
            "Audio started: {} Hz, {} samples per window, estimates below {} Hz",
            audio.sample_rate_hz, audio.window_samples, audio.max_frequency_hz
        );
    }

    /// Shared grid. Cells can be written at any time through this reference.
    pub fn pixel_grid(&self) -> &PixelGrid {
        &self.ctx.grid
    }

    /// Most recent published estimate. 0 for silence, for noise, and before
    /// the first window closes.
    pub fn read_detected_frequency_hz(&self) -> u16 {
        self.ctx.frequency.read_hz()
    }

    pub fn completed_windows(&self) -> u16 {
        self.ctx.frequency.windows()
    }

    /// Conversions the converter has completed.
    pub fn conversions(&self) -> u64 {
        self.ctx.inner.adc.conversions()
    }

    /// Conversions the sample handler has seen, wrapping. Equal to
    /// `conversions` modulo 2^16 unless a result was overwritten before its
    /// handler ran.
    pub fn samples_handled(&self) -> u16 {
        self.ctx.audio.sample_count()
    }

    pub fn window_progress(&mut self) -> WindowProgress {
        self.ctx.critical_section(|ctx| ctx.audio.progress())
    }

    pub fn line_state(&self) -> LineState {
        self.ctx.video.state()
    }

    pub fn frame(&self) -> u64 {
        self.ctx.video.frame()
    }

    pub fn now(&self) -> u64 {
        self.ctx.now()
    }

    pub fn signal(&self) -> &SignalTrace {
        self.ctx.signal()
    }

    pub fn set_analog_source(&mut self, input: impl AnalogSource + 'static) {
        self.ctx.set_input(Box::new(input));
    }

    pub fn run_cycles(&mut self, cycles: u64) {
        let deadline = self.ctx.now() + cycles;
        while self.ctx.now() < deadline {
            self.step(deadline);
        }
    }

    /// Clear the signal trace and run until the next frame-sync handler has
    /// completed. With video stopped this gives up after two frame periods.
    pub fn exec_frame(&mut self) {
        self.ctx.signal_mut().clear();

        let start_frame = self.ctx.video.frame();
        let deadline = self.ctx.now() + 2 * self.frame_period;
        while start_frame == self.ctx.video.frame() && self.ctx.now() < deadline {
            self.step(deadline);
        }
    }

    fn step(&mut self, deadline: u64) {
        self.ctx.tick_sources();

        let pending = if self.sleeping {
            self.ctx.interrupt().next_pending_in(&WAIT_SOURCES)
        } else {
            self.ctx.interrupt().next_pending()
        };

        if pending == Some(InterruptKind::PixelStart) {
            self.sleeping = false;
        }

        match pending {
            Some(kind) => self.service(kind),
            None => self.idle(deadline),
        }
    }

    fn idle(&mut self, deadline: u64) {
        let now = self.ctx.now();
        let until = self
            .ctx
            .next_event_at()
            .map_or(deadline, |at| at.min(deadline));
        self.ctx.elapse(until.saturating_sub(now).max(1));
    }

    fn service(&mut self, kind: InterruptKind) {
        let ctx = &mut self.ctx;

        ctx.interrupt_mut().ack(kind);
        ctx.interrupt_mut().set_master_enable(false);
        ctx.elapse(INTERRUPT_ENTRY_CYCLES);

        match kind {
            InterruptKind::PixelStart => ctx.video.on_pixel_start(&mut ctx.inner, &ctx.grid),
            // Wait for pixel start with only frame sync allowed to run, so the
            // pixel handler always begins the same number of cycles after it
            InterruptKind::LineStart => self.sleeping = true,
            InterruptKind::FrameSync => ctx.video.on_frame_sync(&mut ctx.inner),
            InterruptKind::AdcComplete => ctx.audio.on_conversion(&mut ctx.inner, &ctx.frequency),
        }

        ctx.elapse(INTERRUPT_RETURN_CYCLES);
        ctx.interrupt_mut().set_master_enable(true);
    }
}
