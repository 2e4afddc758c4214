use std::{f64::consts::TAU, fmt};

/// One cell of the pixel grid. The discriminants are the stored values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Pixel {
    Active = 0,
    Background = 1,
}

impl Pixel {
    pub fn from_u8(v: u8) -> Pixel {
        if v == 0 {
            Pixel::Active
        } else {
            Pixel::Background
        }
    }
}

impl fmt::Display for Pixel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pixel::Active => write!(f, "#"),
            Pixel::Background => write!(f, "."),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncPulse {
    Horizontal,
    Vertical,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncEdge {
    pub cycle: u64,
    pub pulse: SyncPulse,
    pub active: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelOut {
    Pixel(Pixel),
    /// Output returned to the blanking level after a row.
    Blank,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelEvent {
    pub cycle: u64,
    pub out: PixelOut,
}

/// Everything the video pins were driven to, with the cycle of each change.
///
/// Pixel outputs are appended in the order the handler drives them. Sync edges
/// are appended when the timers are caught up, so they can trail pixel outputs
/// that happened later; sort by `cycle` for a merged timeline.
#[derive(Default)]
pub struct SignalTrace {
    pixels: Vec<PixelEvent>,
    syncs: Vec<SyncEdge>,
}

impl SignalTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.pixels.clear();
        self.syncs.clear();
    }

    pub fn push_pixel(&mut self, cycle: u64, out: PixelOut) {
        self.pixels.push(PixelEvent { cycle, out });
    }

    pub fn push_sync(&mut self, edge: SyncEdge) {
        self.syncs.push(edge);
    }

    pub fn pixels(&self) -> &[PixelEvent] {
        &self.pixels
    }

    pub fn syncs(&self) -> &[SyncEdge] {
        &self.syncs
    }

    /// Pixel outputs grouped into painted lines, each closed by a blanking
    /// write. Returns `(cycle of first pixel, pixels)` per line.
    pub fn painted_lines(&self) -> Vec<(u64, Vec<Pixel>)> {
        let mut lines = vec![];
        let mut cur: Option<(u64, Vec<Pixel>)> = None;

        for ev in &self.pixels {
            match ev.out {
                PixelOut::Pixel(p) => cur.get_or_insert_with(|| (ev.cycle, vec![])).1.push(p),
                PixelOut::Blank => {
                    if let Some(line) = cur.take() {
                        lines.push(line);
                    }
                }
            }
        }

        lines
    }
}

/// Analog signal presented to the converter input, as a raw converter code.
pub trait AnalogSource {
    fn level(&mut self, seconds: f64) -> u16;
}

impl<T: AnalogSource + ?Sized> AnalogSource for Box<T> {
    fn level(&mut self, seconds: f64) -> u16 {
        (**self).level(seconds)
    }
}

pub struct Constant(pub u16);

impl AnalogSource for Constant {
    fn level(&mut self, _seconds: f64) -> u16 {
        self.0
    }
}

pub struct SquareWave {
    pub freq_hz: f64,
    pub high: u16,
    pub low: u16,
}

impl AnalogSource for SquareWave {
    fn level(&mut self, seconds: f64) -> u16 {
        if (seconds * self.freq_hz).fract() < 0.5 {
            self.high
        } else {
            self.low
        }
    }
}

pub struct SineWave {
    pub freq_hz: f64,
    pub center: u16,
    pub amplitude: u16,
}

impl AnalogSource for SineWave {
    fn level(&mut self, seconds: f64) -> u16 {
        let v = self.center as f64 + self.amplitude as f64 * (TAU * self.freq_hz * seconds).sin();
        v.round().clamp(0.0, u16::MAX as f64) as u16
    }
}
