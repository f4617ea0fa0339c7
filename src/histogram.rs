use crate::errors::{HistogramError, Result};
use crate::frame::{Frame, RgbView};
use crate::record::{HistogramRecord, BINS, CHANNELS};
use rayon::prelude::*;

/// Width of one bin in intensity levels over [0, 256)
const BIN_WIDTH: usize = 256 / BINS;

#[inline]
fn bin_of(value: u8) -> usize {
    value as usize / BIN_WIDTH
}

/// Bins packed RGB samples into `record`
fn accumulate(samples: &[u8], record: &mut HistogramRecord) {
    let bins = record.channels_mut();
    for pixel in samples.chunks_exact(CHANNELS) {
        bins[0][bin_of(pixel[0])] += 1;
        bins[1][bin_of(pixel[1])] += 1;
        bins[2][bin_of(pixel[2])] += 1;
    }
}

// Calculate the 16-bin histogram of each channel
pub fn calculate_histogram(view: &RgbView<'_>) -> HistogramRecord {
    let mut record = HistogramRecord::default();
    accumulate(view.as_raw(), &mut record);
    record
}

/// Same result as [`calculate_histogram`], computed over horizontal tiles in parallel.
pub fn calculate_histogram_tiled(view: &RgbView<'_>, num_tiles: usize) -> HistogramRecord {
    let (width, height) = view.dimensions();
    let row_bytes = width as usize * CHANNELS;
    if row_bytes == 0 || height == 0 {
        return HistogramRecord::default();
    }

    let rows_per_tile = (height as usize).div_ceil(num_tiles.max(1));
    let samples: &[u8] = view.as_raw();

    samples
        .par_chunks(rows_per_tile * row_bytes)
        .map(|tile| {
            let mut local = HistogramRecord::default();
            accumulate(tile, &mut local);
            local
        })
        .reduce(HistogramRecord::default, |mut total, local| {
            total.merge(&local);
            total
        })
}

/// Adaptive tile count based on image size
pub fn optimal_tile_count(width: u32, height: u32) -> usize {
    let total_pixels = width as u64 * height as u64;
    let min_tiles = 2;
    let max_tiles = num_cpus::get().max(min_tiles);

    if total_pixels < 1_000_000 {
        min_tiles
    } else if total_pixels < 10_000_000 {
        (max_tiles / 2).max(min_tiles)
    } else {
        max_tiles
    }
}

/// Validates one frame of a batch and computes its histogram.
///
/// Frames above `tile_threshold` pixels take the tiled path.
pub fn compute_frame_histogram(frame: &Frame, index: usize, tile_threshold: Option<u64>) -> Result<HistogramRecord> {
    frame.validate_for_histogram(index)?;
    let view = frame.as_rgb_view().ok_or_else(|| HistogramError::FrameSizeMismatch {
        width: frame.width(),
        height: frame.height(),
        expected: frame.pixel_count() as usize * CHANNELS,
        actual: frame.data().len(),
    })?;

    let record = match tile_threshold {
        Some(threshold) if frame.pixel_count() > threshold => {
            let tiles = optimal_tile_count(frame.width(), frame.height());
            tracing::trace!(index, tiles, "tiled histogram");
            calculate_histogram_tiled(&view, tiles)
        }
        _ => calculate_histogram(&view),
    };

    Ok(record)
}
