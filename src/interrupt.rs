use bitvec::prelude::*;
use log::debug;

#[derive(Default, Debug)]
pub struct Interrupt {
    master_enable: bool,
    enable: u8,
    request: u8,
}

/// Interrupt sources, in vector order. A lower discriminant is serviced first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptKind {
    PixelStart = 0,
    LineStart = 1,
    FrameSync = 2,
    AdcComplete = 3,
}

impl InterruptKind {
    pub const ALL: [InterruptKind; 4] = [
        InterruptKind::PixelStart,
        InterruptKind::LineStart,
        InterruptKind::FrameSync,
        InterruptKind::AdcComplete,
    ];

    fn from_index(index: usize) -> Option<InterruptKind> {
        Self::ALL.get(index).copied()
    }

    fn name(self) -> &'static str {
        match self {
            InterruptKind::PixelStart => "PixelStart",
            InterruptKind::LineStart => "LineStart",
            InterruptKind::FrameSync => "FrameSync",
            InterruptKind::AdcComplete => "AdcComplete",
        }
    }
}

impl Interrupt {
    pub fn new() -> Interrupt {
        Interrupt::default()
    }

    pub fn master_enable(&self) -> bool {
        self.master_enable
    }

    pub fn set_master_enable(&mut self, enable: bool) {
        self.master_enable = enable;
    }

    pub fn set_enable(&mut self, enable: u8) {
        if log::log_enabled!(log::Level::Debug) {
            let names = enable
                .view_bits::<Lsb0>()
                .iter_ones()
                .filter_map(InterruptKind::from_index)
                .map(InterruptKind::name)
                .collect::<Vec<_>>();

            debug!("Set interrupt enable: [{}]", names.join(", "));
        }

        self.enable = enable;
    }

    pub fn enable_source(&mut self, source: InterruptKind, enable: bool) {
        let mut mask = self.enable;
        mask.view_bits_mut::<Lsb0>().set(source as usize, enable);
        self.set_enable(mask);
    }

    #[cfg(test)]
    pub fn request(&self) -> u8 {
        self.request
    }

    /// Latch a request. A source that is already pending stays pending once:
    /// repeated events before it is serviced are not queued.
    pub fn set_interrupt(&mut self, source: InterruptKind) {
        self.request.view_bits_mut::<Lsb0>().set(source as usize, true);
    }

    pub fn ack(&mut self, source: InterruptKind) {
        self.request.view_bits_mut::<Lsb0>().set(source as usize, false);
    }

    /// Highest-priority source that is both enabled and requested, if the
    /// global enable is set.
    pub fn next_pending(&self) -> Option<InterruptKind> {
        self.next_pending_in(&InterruptKind::ALL)
    }

    /// Like `next_pending`, considering only `sources`.
    pub fn next_pending_in(&self, sources: &[InterruptKind]) -> Option<InterruptKind> {
        if !self.master_enable {
            return None;
        }

        let mut mask = 0u8;
        for &source in sources {
            mask.view_bits_mut::<Lsb0>().set(source as usize, true);
        }

        (self.enable & self.request & mask)
            .view_bits::<Lsb0>()
            .first_one()
            .and_then(InterruptKind::from_index)
    }
}
