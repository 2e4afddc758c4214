use crate::{
    config::AudioConfig,
    consts::{SAMPLE_CYCLES, WINDOW_CLOSE_CYCLES},
    context::{Converter, Timing},
    pitch::{estimate_frequency_hz, FrequencyRegister},
    util::trait_alias,
};

trait_alias!(pub trait Context = Timing + Converter);

/// Counters of the window in progress, read together.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WindowProgress {
    pub samples_in_window: u16,
    pub zero_crossings: u16,
}

/// Zero-crossing counter fed by the conversion-complete interrupt.
pub struct Audio {
    config: AudioConfig,
    midpoint: i16,

    last_sample: i16,
    zero_crossings: u16,
    samples_in_window: u16,
    sample_count: u16,
}

impl Audio {
    pub fn new(config: &AudioConfig) -> Audio {
        Audio {
            config: config.clone(),
            midpoint: config.midpoint(),
            last_sample: 0,
            zero_crossings: 0,
            samples_in_window: 0,
            sample_count: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = Audio::new(&self.config);
    }

    #[cfg(test)]
    pub fn last_sample(&self) -> i16 {
        self.last_sample
    }

    /// Total conversions handled, wrapping.
    pub fn sample_count(&self) -> u16 {
        self.sample_count
    }

    pub fn progress(&self) -> WindowProgress {
        WindowProgress {
            samples_in_window: self.samples_in_window,
            zero_crossings: self.zero_crossings,
        }
    }

    /// Conversion-complete handler.
    pub fn on_conversion(&mut self, ctx: &mut impl Context, register: &FrequencyRegister) {
        let raw = ctx.adc_result();
        let closed = self.push_sample(raw, register);

        ctx.elapse(if closed {
            SAMPLE_CYCLES + WINDOW_CLOSE_CYCLES
        } else {
            SAMPLE_CYCLES
        });
    }

    /// Account one converted sample. Returns whether it closed the window.
    pub fn push_sample(&mut self, raw: u16, register: &FrequencyRegister) -> bool {
        let centered = raw as i16 - self.midpoint;
        self.samples_in_window += 1;
        self.sample_count = self.sample_count.wrapping_add(1);

        // Positive-going only, one count per cycle
        if self.last_sample <= 0 && centered > 0 {
            self.zero_crossings += 1;
        }
        self.last_sample = centered;

        if self.samples_in_window < self.config.window_samples {
            return false;
        }

        self.close_window(register);
        true
    }

    fn close_window(&mut self, register: &FrequencyRegister) {
        let hz = estimate_frequency_hz(
            self.zero_crossings,
            self.config.window_samples,
            self.config.sample_rate_hz,
            self.config.max_frequency_hz,
        );

        log::debug!(
            "Window closed: {} crossings in {} samples -> {hz} Hz",
            self.zero_crossings,
            self.samples_in_window
        );

        register.publish(hz);
        self.samples_in_window = 0;
        self.zero_crossings = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn audio() -> Audio {
        Audio::new(&AudioConfig::default())
    }

    /// Feeds `samples` raw values of a square wave with `period` samples per
    /// cycle, starting on the low half.
    fn feed_square(a: &mut Audio, reg: &FrequencyRegister, period: usize, samples: usize) {
        for i in 0..samples {
            let raw = if i % period < period / 2 { 100 } else { 900 };
            a.push_sample(raw, reg);
        }
    }

    #[test]
    fn centering_around_midpoint() {
        let reg = FrequencyRegister::new();
        let mut a = audio();
        a.push_sample(0, &reg);
        assert_eq!(a.last_sample(), -512);
        a.push_sample(1023, &reg);
        assert_eq!(a.last_sample(), 511);
        a.push_sample(512, &reg);
        assert_eq!(a.last_sample(), 0);
    }

    #[test]
    fn counts_only_positive_going_crossings() {
        let reg = FrequencyRegister::new();
        let mut a = audio();

        // -, +, -, +, 0, +
        for raw in [100, 900, 100, 900, 512, 900] {
            a.push_sample(raw, &reg);
        }
        // 0 followed by positive counts as a crossing
        assert_eq!(a.progress().zero_crossings, 3);
        assert_eq!(a.progress().samples_in_window, 6);
    }

    #[test]
    fn square_wave_estimate_within_one_bin() {
        let reg = FrequencyRegister::new();
        let mut a = audio();

        // 32 samples per cycle at 9615 Hz is 300.47 Hz
        feed_square(&mut a, &reg, 32, 1024);

        let bin = 9_615 / 1024 + 1;
        let hz = reg.read_hz() as i64;
        assert!((hz - 300).abs() <= bin, "estimate {hz}");
        assert_eq!(reg.windows(), 1);
    }

    #[test]
    fn crossing_count_matches_tone_cycles_in_window() {
        let reg = FrequencyRegister::new();
        let mut a = audio();

        // One sample short of closing: a window holds 1024 / 32 cycles
        feed_square(&mut a, &reg, 32, 1023);
        let p = a.progress();
        assert_eq!(p.samples_in_window, 1023);
        assert!((p.zero_crossings as i32 - 32).abs() <= 1, "{p:?}");
        assert_eq!(reg.windows(), 0);

        // Period that does not divide the window
        let mut a = audio();
        feed_square(&mut a, &reg, 30, 1023);
        let expected = 1024.0 / 30.0;
        let crossings = a.progress().zero_crossings as f64;
        assert!((crossings - expected).abs() <= 1.0, "{crossings}");
    }

    #[test]
    fn exact_crossing_count_gives_exact_estimate() {
        let reg = FrequencyRegister::new();
        let mut a = audio();

        // 33 positive-going crossings, then padding at a steady level
        for _ in 0..33 {
            a.push_sample(100, &reg);
            a.push_sample(900, &reg);
        }
        for _ in 66..1024 {
            a.push_sample(900, &reg);
        }

        // 33 * 9615 / 1024, truncated
        assert_eq!(reg.read_hz(), 309);
    }

    #[test]
    fn silence_and_one_signed_input_read_zero() {
        for level in [512, 900, 100] {
            let reg = FrequencyRegister::new();
            let mut a = audio();
            // The first window may see the step up from the reset state
            for _ in 0..2 * 1024 {
                a.push_sample(level, &reg);
            }
            assert_eq!(reg.windows(), 2);
            assert_eq!(reg.read_hz(), 0, "level {level}");
        }
    }

    #[test]
    fn noise_above_limit_is_rejected() {
        let reg = FrequencyRegister::new();
        let mut a = Audio::new(&AudioConfig {
            max_frequency_hz: 4_000,
            ..AudioConfig::default()
        });

        // Alternate every sample: 512 crossings per window, 4807 Hz
        for i in 0..1024 {
            a.push_sample(if i % 2 == 0 { 0 } else { 1023 }, &reg);
        }
        assert_eq!(reg.windows(), 1);
        assert_eq!(reg.read_hz(), 0);
    }

    #[test]
    fn counters_reset_after_window_and_never_exceed_it() {
        let reg = FrequencyRegister::new();
        let mut a = audio();

        for i in 0..3 * 1024 + 10 {
            let raw = if i % 40 < 20 { 100 } else { 900 };
            let closed = a.push_sample(raw, &reg);
            let p = a.progress();
            assert!(p.samples_in_window < 1024);
            if closed {
                assert_eq!(p, WindowProgress::default());
            }
        }

        assert_eq!(reg.windows(), 3);
        assert_eq!(a.progress().samples_in_window, 10);
        assert_eq!(a.sample_count(), 3 * 1024 + 10);
    }

    #[test]
    fn last_sample_carries_across_windows() {
        let reg = FrequencyRegister::new();
        let mut a = audio();

        for _ in 0..1024 {
            a.push_sample(100, &reg);
        }
        assert_eq!(a.last_sample(), -412);

        a.push_sample(900, &reg);
        assert_eq!(a.progress().zero_crossings, 1);
    }

    #[test]
    fn reset_clears_state() {
        let reg = FrequencyRegister::new();
        let mut a = audio();
        feed_square(&mut a, &reg, 16, 100);
        a.reset();
        assert_eq!(a.progress(), WindowProgress::default());
        assert_eq!(a.last_sample(), 0);
        assert_eq!(a.sample_count(), 0);
    }
}
