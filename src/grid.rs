//! Shared logical framebuffer.
//!
//! The game side writes cells at its own cadence while the pixel handler reads
//! one row per painted line. Every cell is an independently atomic byte, so a
//! row read racing a writer can show a mix of old and new cells (a one-line
//! glitch, repaired on the next frame), but never a torn cell.

use std::sync::atomic::{AtomicU8, Ordering};

use thiserror::Error;

use crate::{
    consts::{SCREEN_HEIGHT, SCREEN_WIDTH},
    interface::Pixel,
};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum GridError {
    #[error("cell ({row}, {col}) is outside the {}x{} grid", SCREEN_HEIGHT, SCREEN_WIDTH)]
    OutOfBounds { row: usize, col: usize },
}

pub struct PixelGrid {
    cells: [[AtomicU8; SCREEN_WIDTH]; SCREEN_HEIGHT],
}

impl Default for PixelGrid {
    fn default() -> Self {
        Self::new()
    }
}

impl PixelGrid {
    pub const WIDTH: usize = SCREEN_WIDTH;
    pub const HEIGHT: usize = SCREEN_HEIGHT;

    /// A grid with every cell set to background.
    pub const fn new() -> Self {
        #[allow(clippy::declare_interior_mutable_const)]
        const CELL: AtomicU8 = AtomicU8::new(Pixel::Background as u8);
        #[allow(clippy::declare_interior_mutable_const)]
        const ROW: [AtomicU8; SCREEN_WIDTH] = [CELL; SCREEN_WIDTH];

        PixelGrid {
            cells: [ROW; SCREEN_HEIGHT],
        }
    }

    fn cell(&self, row: usize, col: usize) -> Result<&AtomicU8, GridError> {
        self.cells
            .get(row)
            .and_then(|r| r.get(col))
            .ok_or(GridError::OutOfBounds { row, col })
    }

    pub fn set(&self, row: usize, col: usize, pixel: Pixel) -> Result<(), GridError> {
        self.cell(row, col)?.store(pixel as u8, Ordering::Relaxed);
        Ok(())
    }

    pub fn get(&self, row: usize, col: usize) -> Result<Pixel, GridError> {
        Ok(Pixel::from_u8(self.cell(row, col)?.load(Ordering::Relaxed)))
    }

    pub fn fill(&self, pixel: Pixel) {
        for cell in self.cells.iter().flatten() {
            cell.store(pixel as u8, Ordering::Relaxed);
        }
    }

    pub fn clear(&self) {
        self.fill(Pixel::Background);
    }

    /// Cells of one row, left to right.
    pub fn row(&self, row: usize) -> Option<impl Iterator<Item = Pixel> + '_> {
        self.cells
            .get(row)
            .map(|r| r.iter().map(|c| Pixel::from_u8(c.load(Ordering::Relaxed))))
    }
}
