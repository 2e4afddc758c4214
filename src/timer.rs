use log::debug;
use modular_bitfield::prelude::*;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{
    context::{Interrupt, Timing, VideoOut},
    interface::SyncPulse,
    interrupt::InterruptKind,
    util::trait_alias,
};

trait_alias!(pub trait Context = Timing + Interrupt + VideoOut);

/// A hardware source of periodic events the scheduler can idle towards.
pub trait EventSource {
    /// Absolute cycle of the next event, or `None` while the source is stopped.
    fn next_event_at(&self) -> Option<u64>;
}

#[derive(BitfieldSpecifier, Serialize, Deserialize, JsonSchema, Clone, Copy, Debug, PartialEq, Eq)]
#[bits = 3]
pub enum ClockSelect {
    Stopped = 0,
    Div1 = 1,
    Div8 = 2,
    Div64 = 3,
    Div256 = 4,
    Div1024 = 5,
    ExternalFalling = 6,
    ExternalRising = 7,
}

impl ClockSelect {
    pub fn divisor(self) -> Option<u64> {
        match self {
            ClockSelect::Div1 => Some(1),
            ClockSelect::Div8 => Some(8),
            ClockSelect::Div64 => Some(64),
            ClockSelect::Div256 => Some(256),
            ClockSelect::Div1024 => Some(1024),
            ClockSelect::Stopped | ClockSelect::ExternalFalling | ClockSelect::ExternalRising => {
                None
            }
        }
    }
}

#[bitfield]
#[repr(u8)]
#[derive(Clone, Copy, Debug)]
pub struct TimerControl {
    pub clock: ClockSelect,
    pub sync_output: bool,
    #[skip]
    __: B4,
}

/// Initial register image for one timer.
#[derive(Clone, Copy, Debug)]
pub struct TimerSetup {
    pub clock: ClockSelect,
    pub top: u16,
    pub compare_b: u16,
    pub sync_output: bool,
}

pub struct Timers {
    pub frame: Timer,
    pub line: Timer,
}

impl Default for Timers {
    fn default() -> Self {
        Timers {
            frame: Timer::new(Some(InterruptKind::FrameSync), None, SyncPulse::Vertical),
            line: Timer::new(
                Some(InterruptKind::LineStart),
                Some(InterruptKind::PixelStart),
                SyncPulse::Horizontal,
            ),
        }
    }
}

impl Timers {
    pub fn tick(&mut self, ctx: &mut impl Context) {
        self.frame.tick(ctx);
        self.line.tick(ctx);
    }
}

/// Free-running counter in fast-PWM-to-top mode: counts prescaled cycles from
/// 0 to `top`, then wraps.
pub struct Timer {
    control: TimerControl,
    counter: u16,
    top: u16,
    compare_b: u16,

    overflow_irq: Option<InterruptKind>,
    compare_b_irq: Option<InterruptKind>,
    pulse: SyncPulse,

    prev_clock: u64,
    fraction: u64,
}

impl Timer {
    fn new(
        overflow_irq: Option<InterruptKind>,
        compare_b_irq: Option<InterruptKind>,
        pulse: SyncPulse,
    ) -> Timer {
        Timer {
            control: TimerControl::new(),
            counter: 0,
            top: 0xFFFF,
            compare_b: 0,
            overflow_irq,
            compare_b_irq,
            pulse,
            prev_clock: 0,
            fraction: 0,
        }
    }

    #[cfg(test)]
    pub fn counter(&self) -> u16 {
        self.counter
    }

    /// Cycles between two overflows, or `None` while stopped.
    pub fn period(&self) -> Option<u64> {
        self.divisor().map(|div| (self.top as u64 + 1) * div)
    }

    pub fn configure(&mut self, ctx: &mut impl Context, setup: &TimerSetup) {
        self.set_top(setup.top);
        self.set_compare_b(setup.compare_b);
        self.counter = 0;
        self.write_control(
            ctx,
            TimerControl::new()
                .with_clock(setup.clock)
                .with_sync_output(setup.sync_output),
        );
    }

    pub fn set_top(&mut self, top: u16) {
        self.top = top;
        if self.counter > top {
            self.counter = 0;
        }
    }

    pub fn set_compare_b(&mut self, compare_b: u16) {
        self.compare_b = compare_b;
    }

    pub fn write_control(&mut self, ctx: &mut impl Context, control: TimerControl) {
        let was_running = self.divisor().is_some();

        self.control = control;

        if !was_running && self.divisor().is_some() {
            self.prev_clock = ctx.now();
            self.fraction = 0;
        }

        debug!(
            "{:?} timer: clock={:?}, top={}, compare_b={}, period={:?}",
            self.pulse,
            control.clock(),
            self.top,
            self.compare_b,
            self.period()
        );
    }

    fn divisor(&self) -> Option<u64> {
        self.control.clock().divisor()
    }

    /// Counts until the next wrap or compare match, always at least one.
    fn counts_to_event(&self) -> u64 {
        let modulo = self.top as u64 + 1;
        let counter = self.counter as u64;
        let to_wrap = modulo - counter;

        let compare = self.compare_b as u64;
        let to_compare = if compare > self.top as u64 {
            u64::MAX
        } else {
            match (compare + modulo - counter) % modulo {
                0 => modulo,
                n => n,
            }
        };

        to_wrap.min(to_compare)
    }

    pub fn tick(&mut self, ctx: &mut impl Context) {
        let Some(div) = self.divisor() else {
            return;
        };

        let now = ctx.now();
        let elapsed = now - self.prev_clock;
        self.prev_clock = now;

        self.fraction += elapsed;
        let mut counts = self.fraction / div;
        self.fraction %= div;

        let modulo = self.top as u64 + 1;

        while counts > 0 {
            let to_event = self.counts_to_event();
            let step = counts.min(to_event);
            counts -= step;
            self.counter = ((self.counter as u64 + step) % modulo) as u16;

            if step < to_event {
                break;
            }

            // Cycle at which the counter took this value
            let at = now - self.fraction - counts * div;

            if self.counter == 0 {
                if self.control.sync_output() {
                    ctx.set_sync(self.pulse, true, at);
                }
                if let Some(kind) = self.overflow_irq {
                    ctx.interrupt_mut().set_interrupt(kind);
                }
            }

            if self.counter == self.compare_b {
                if self.control.sync_output() {
                    ctx.set_sync(self.pulse, false, at);
                }
                if let Some(kind) = self.compare_b_irq {
                    ctx.interrupt_mut().set_interrupt(kind);
                }
            }
        }
    }
}

impl EventSource for Timer {
    fn next_event_at(&self) -> Option<u64> {
        let div = self.divisor()?;
        Some(self.prev_clock + self.counts_to_event() * div - self.fraction)
    }
}
