use std::sync::atomic::{AtomicU16, Ordering};

use log::debug;

/// Frequency of a window with `zero_crossings` positive-going crossings,
/// truncated to whole hertz. Estimates at or above `max_frequency_hz` are
/// noise and read as 0.
pub fn estimate_frequency_hz(
    zero_crossings: u16,
    window_samples: u16,
    sample_rate_hz: u32,
    max_frequency_hz: u32,
) -> u16 {
    if window_samples == 0 {
        return 0;
    }

    let hz = zero_crossings as u64 * sample_rate_hz as u64 / window_samples as u64;

    if hz >= max_frequency_hz as u64 {
        debug!("Rejecting implausible estimate: {hz} Hz ({zero_crossings} crossings)");
        return 0;
    }

    hz as u16
}

/// Most recent estimate, overwritten once per closed window.
///
/// 0 means either "silence" or "no window closed yet"; the two are not
/// distinguishable from the estimate alone.
#[derive(Default, Debug)]
pub struct FrequencyRegister {
    hz: AtomicU16,
    windows: AtomicU16,
}

impl FrequencyRegister {
    pub const fn new() -> Self {
        FrequencyRegister {
            hz: AtomicU16::new(0),
            windows: AtomicU16::new(0),
        }
    }

    pub fn publish(&self, hz: u16) {
        self.hz.store(hz, Ordering::Relaxed);
        // Single writer, so no read-modify-write is needed
        let windows = self.windows.load(Ordering::Relaxed);
        self.windows.store(windows.wrapping_add(1), Ordering::Relaxed);
    }

    pub fn read_hz(&self) -> u16 {
        self.hz.load(Ordering::Relaxed)
    }

    /// Number of windows closed so far, wrapping.
    pub fn windows(&self) -> u16 {
        self.windows.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.hz.store(0, Ordering::Relaxed);
        self.windows.store(0, Ordering::Relaxed);
    }
}
