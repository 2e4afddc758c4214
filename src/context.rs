use ambassador::{delegatable_trait, Delegate};

use crate::{
    adc::Adc,
    audio::Audio,
    config::Config,
    grid::PixelGrid,
    interface::{AnalogSource, Pixel, PixelOut, SignalTrace, SyncEdge, SyncPulse},
    interrupt,
    pitch::FrequencyRegister,
    timer::{EventSource, Timers},
    video::Video,
};

#[delegatable_trait]
pub trait Timing {
    fn now(&self) -> u64;
    fn elapse(&mut self, cycles: u64);
}

#[delegatable_trait]
pub trait Interrupt {
    fn interrupt(&self) -> &interrupt::Interrupt;
    fn interrupt_mut(&mut self) -> &mut interrupt::Interrupt;
}

#[delegatable_trait]
pub trait VideoOut {
    fn emit_pixel(&mut self, pixel: Pixel);
    fn blank(&mut self);
    fn set_sync(&mut self, pulse: SyncPulse, active: bool, cycle: u64);
}

#[delegatable_trait]
pub trait AnalogIn {
    /// Input level at `cycle`, as a raw converter code.
    fn analog_input(&mut self, cycle: u64) -> u16;
}

#[delegatable_trait]
pub trait Converter {
    fn adc_result(&self) -> u16;
}

#[derive(Delegate)]
#[delegate(Timing, target = "inner")]
#[delegate(Interrupt, target = "inner")]
#[delegate(VideoOut, target = "inner")]
#[delegate(Converter, target = "inner")]
pub struct Context {
    pub video: Video,
    pub audio: Audio,
    pub grid: PixelGrid,
    pub frequency: FrequencyRegister,
    pub inner: Inner,
}

#[derive(Delegate)]
#[delegate(Timing, target = "inner")]
#[delegate(Interrupt, target = "inner")]
#[delegate(VideoOut, target = "inner")]
#[delegate(AnalogIn, target = "inner")]
pub struct Inner {
    pub timers: Timers,
    pub adc: Adc,
    pub inner: Inner2,
}

pub struct Inner2 {
    interrupt: interrupt::Interrupt,
    clock: u64,
    cpu_clock_hz: u32,
    signal: SignalTrace,
    input: Box<dyn AnalogSource>,
}

impl Context {
    pub fn new(config: &Config, input: Box<dyn AnalogSource>) -> Self {
        Context {
            video: Video::new(&config.video),
            audio: Audio::new(&config.audio),
            grid: PixelGrid::new(),
            frequency: FrequencyRegister::new(),
            inner: Inner {
                timers: Timers::default(),
                adc: Adc::new(config.audio.adc_max),
                inner: Inner2 {
                    interrupt: interrupt::Interrupt::new(),
                    clock: 0,
                    cpu_clock_hz: config.cpu_clock_hz,
                    signal: SignalTrace::new(),
                    input,
                },
            },
        }
    }

    /// Bring every hardware event source up to the current cycle.
    pub fn tick_sources(&mut self) {
        let inner = &mut self.inner;
        inner.timers.tick(&mut inner.inner);
        inner.adc.tick(&mut inner.inner);
    }

    /// Earliest pending hardware event across all running sources.
    pub fn next_event_at(&self) -> Option<u64> {
        let inner = &self.inner;
        [
            inner.timers.frame.next_event_at(),
            inner.timers.line.next_event_at(),
            inner.adc.next_event_at(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Run `f` with the global interrupt enable cleared, then restore it.
    pub fn critical_section<R>(&mut self, f: impl FnOnce(&mut Context) -> R) -> R {
        let enabled = self.interrupt().master_enable();
        self.interrupt_mut().set_master_enable(false);
        let ret = f(self);
        self.interrupt_mut().set_master_enable(enabled);
        ret
    }

    pub fn signal(&self) -> &SignalTrace {
        &self.inner.inner.signal
    }

    pub fn signal_mut(&mut self) -> &mut SignalTrace {
        &mut self.inner.inner.signal
    }

    pub fn set_input(&mut self, input: Box<dyn AnalogSource>) {
        self.inner.inner.input = input;
    }
}

impl Converter for Inner {
    fn adc_result(&self) -> u16 {
        self.adc.result()
    }
}

impl Timing for Inner2 {
    fn now(&self) -> u64 {
        self.clock
    }

    fn elapse(&mut self, cycles: u64) {
        self.clock += cycles;
    }
}

impl Interrupt for Inner2 {
    fn interrupt(&self) -> &interrupt::Interrupt {
        &self.interrupt
    }

    fn interrupt_mut(&mut self) -> &mut interrupt::Interrupt {
        &mut self.interrupt
    }
}

impl VideoOut for Inner2 {
    fn emit_pixel(&mut self, pixel: Pixel) {
        self.signal.push_pixel(self.clock, PixelOut::Pixel(pixel));
    }

    fn blank(&mut self) {
        self.signal.push_pixel(self.clock, PixelOut::Blank);
    }

    fn set_sync(&mut self, pulse: SyncPulse, active: bool, cycle: u64) {
        self.signal.push_sync(SyncEdge {
            cycle,
            pulse,
            active,
        });
    }
}

impl AnalogIn for Inner2 {
    fn analog_input(&mut self, cycle: u64) -> u16 {
        let seconds = cycle as f64 / self.cpu_clock_hz as f64;
        self.input.level(seconds)
    }
}
