use log::debug;
use modular_bitfield::prelude::*;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{
    context::{AnalogIn, Interrupt, Timing},
    interrupt::InterruptKind,
    consts::CONVERSION_CLOCKS,
    timer::EventSource,
    util::trait_alias,
};

trait_alias!(pub trait Context = Timing + Interrupt + AnalogIn);

#[derive(BitfieldSpecifier, Serialize, Deserialize, JsonSchema, Clone, Copy, Debug, PartialEq, Eq)]
#[bits = 3]
pub enum AdcPrescaler {
    Div2Default = 0,
    Div2 = 1,
    Div4 = 2,
    Div8 = 3,
    Div16 = 4,
    Div32 = 5,
    Div64 = 6,
    Div128 = 7,
}

impl AdcPrescaler {
    const ALL: [AdcPrescaler; 8] = [
        AdcPrescaler::Div2Default,
        AdcPrescaler::Div2,
        AdcPrescaler::Div4,
        AdcPrescaler::Div8,
        AdcPrescaler::Div16,
        AdcPrescaler::Div32,
        AdcPrescaler::Div64,
        AdcPrescaler::Div128,
    ];

    pub fn divisor(self) -> u64 {
        match self {
            AdcPrescaler::Div2Default | AdcPrescaler::Div2 => 2,
            AdcPrescaler::Div4 => 4,
            AdcPrescaler::Div8 => 8,
            AdcPrescaler::Div16 => 16,
            AdcPrescaler::Div32 => 32,
            AdcPrescaler::Div64 => 64,
            AdcPrescaler::Div128 => 128,
        }
    }

    /// CPU cycles from one conversion result to the next.
    pub fn conversion_cycles(self) -> u64 {
        self.divisor() * CONVERSION_CLOCKS
    }

    /// The prescaler whose conversion rate, rounded down to whole hertz, is
    /// `sample_rate_hz`.
    pub fn for_rate(cpu_clock_hz: u32, sample_rate_hz: u32) -> Option<AdcPrescaler> {
        if sample_rate_hz == 0 {
            return None;
        }
        Self::ALL
            .into_iter()
            .rev()
            .find(|p| cpu_clock_hz as u64 / p.conversion_cycles() == sample_rate_hz as u64)
    }
}

#[bitfield]
#[repr(u8)]
#[derive(Clone, Copy, Debug)]
pub struct AdcControl {
    pub prescaler: AdcPrescaler,
    pub interrupt_enable: bool,
    // Completion flag lives in the interrupt controller
    #[skip]
    __: bool,
    pub auto_trigger: bool,
    pub start: bool,
    pub enable: bool,
}

/// Free-running converter: once enabled and started with auto-trigger set, a
/// new conversion starts as soon as the previous one completes. Each
/// conversion takes `CONVERSION_CLOCKS` prescaled converter clocks.
pub struct Adc {
    control: AdcControl,
    result: u16,
    max: u16,
    converting: bool,
    conversions: u64,

    prev_clock: u64,
    fraction: u64,
}

impl Adc {
    pub fn new(max: u16) -> Adc {
        Adc {
            control: AdcControl::new(),
            result: 0,
            max,
            converting: false,
            conversions: 0,
            prev_clock: 0,
            fraction: 0,
        }
    }

    /// Latched result of the most recent conversion.
    pub fn result(&self) -> u16 {
        self.result
    }

    pub fn conversions(&self) -> u64 {
        self.conversions
    }

    pub fn write_control(&mut self, ctx: &mut impl Context, control: AdcControl) {
        self.control = control;

        if !(control.enable() && control.auto_trigger()) {
            self.converting = false;
        } else if control.start() && !self.converting {
            self.converting = true;
            self.prev_clock = ctx.now();
            self.fraction = 0;
        }

        debug!(
            "ADC: enable={}, free_running={}, irq={}, clock=/{}",
            control.enable(),
            control.auto_trigger(),
            control.interrupt_enable(),
            control.prescaler().divisor()
        );
    }

    pub fn tick(&mut self, ctx: &mut impl Context) {
        if !self.converting {
            return;
        }

        let now = ctx.now();
        let elapsed = now - self.prev_clock;
        self.prev_clock = now;

        let period = self.control.prescaler().conversion_cycles();
        self.fraction += elapsed;
        let completed = self.fraction / period;
        self.fraction %= period;

        if completed == 0 {
            return;
        }

        // Intermediate results are overwritten before anyone can read them
        let at = now - self.fraction;
        self.result = ctx.analog_input(at).min(self.max);
        self.conversions += completed;

        if self.control.interrupt_enable() {
            ctx.interrupt_mut().set_interrupt(InterruptKind::AdcComplete);
        }
    }
}

impl EventSource for Adc {
    fn next_event_at(&self) -> Option<u64> {
        if !self.converting {
            return None;
        }
        Some(self.prev_clock + self.control.prescaler().conversion_cycles() - self.fraction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupt;

    struct Bench {
        now: u64,
        interrupt: interrupt::Interrupt,
        reads: Vec<u64>,
    }

    impl Timing for Bench {
        fn now(&self) -> u64 {
            self.now
        }

        fn elapse(&mut self, cycles: u64) {
            self.now += cycles;
        }
    }

    impl Interrupt for Bench {
        fn interrupt(&self) -> &interrupt::Interrupt {
            &self.interrupt
        }

        fn interrupt_mut(&mut self) -> &mut interrupt::Interrupt {
            &mut self.interrupt
        }
    }

    impl AnalogIn for Bench {
        fn analog_input(&mut self, cycle: u64) -> u16 {
            self.reads.push(cycle);
            (cycle / 16) as u16
        }
    }

    fn bench() -> Bench {
        Bench {
            now: 0,
            interrupt: interrupt::Interrupt::new(),
            reads: vec![],
        }
    }

    fn free_running() -> AdcControl {
        AdcControl::new()
            .with_enable(true)
            .with_start(true)
            .with_auto_trigger(true)
            .with_interrupt_enable(true)
            .with_prescaler(AdcPrescaler::Div128)
    }

    #[test]
    fn prescaler_for_rate() {
        assert_eq!(
            AdcPrescaler::for_rate(16_000_000, 9_615),
            Some(AdcPrescaler::Div128)
        );
        assert_eq!(
            AdcPrescaler::for_rate(16_000_000, 76_923),
            Some(AdcPrescaler::Div16)
        );
        assert_eq!(
            AdcPrescaler::for_rate(16_000_000, 615_384),
            Some(AdcPrescaler::Div2)
        );
        // One result per prescaled clock is not a real conversion rate
        assert_eq!(AdcPrescaler::for_rate(16_000_000, 125_000), None);
        assert_eq!(AdcPrescaler::for_rate(16_000_000, 44_100), None);
        assert_eq!(AdcPrescaler::for_rate(16_000_000, 0), None);
    }

    #[test]
    fn register_layout() {
        let bits: u8 = free_running().into();
        assert_eq!(bits, 0b1110_1111);
    }

    #[test]
    fn free_running_conversions() {
        let mut b = bench();
        let mut adc = Adc::new(1023);
        adc.write_control(&mut b, free_running());
        assert_eq!(adc.next_event_at(), Some(1664));

        b.elapse(1663);
        adc.tick(&mut b);
        assert_eq!(b.interrupt.request(), 0);

        b.elapse(1);
        adc.tick(&mut b);
        assert_eq!(adc.result(), 104);
        assert_eq!(b.interrupt.request(), 1 << InterruptKind::AdcComplete as u8);
        assert_eq!(adc.next_event_at(), Some(3328));

        b.elapse(3 * 1664 + 5);
        adc.tick(&mut b);
        assert_eq!(adc.conversions(), 4);
        assert_eq!(adc.result(), 416);
        assert_eq!(b.reads, vec![1664, 6656]);
        assert_eq!(adc.next_event_at(), Some(8320));
    }

    #[test]
    fn result_is_clamped_to_converter_range() {
        let mut b = bench();
        let mut adc = Adc::new(1023);
        adc.write_control(&mut b, free_running());
        b.elapse(1664 * 10);
        adc.tick(&mut b);
        assert_eq!(adc.result(), 1023);
    }

    #[test]
    fn converter_runs_only_when_free_running() {
        let mut b = bench();
        let mut adc = Adc::new(1023);
        adc.write_control(&mut b, free_running().with_auto_trigger(false));
        b.elapse(1664 * 3);
        adc.tick(&mut b);
        assert_eq!(adc.conversions(), 0);
        assert_eq!(adc.next_event_at(), None);
    }

    #[test]
    fn disabled_converter_is_idle() {
        let mut b = bench();
        let mut adc = Adc::new(1023);
        adc.write_control(&mut b, free_running().with_enable(false));
        b.elapse(10_000);
        adc.tick(&mut b);
        assert_eq!(adc.conversions(), 0);
        assert_eq!(adc.next_event_at(), None);
    }
}
