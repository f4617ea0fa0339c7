use crate::columns::Column;
use crate::errors::{HistogramError, Result};
use serde::{Deserialize, Serialize};

/// Number of intensity bins per channel
pub const BINS: usize = 16;
/// Number of color channels binned per frame
pub const CHANNELS: usize = 3;
/// Serialized size of one record: 3 channels x 16 bins x u32
pub const RECORD_SIZE: usize = BINS * CHANNELS * std::mem::size_of::<u32>();

pub type ChannelBins = [u32; BINS];

/// Per-channel 16-bin histogram of one frame.
///
/// The wire layout is the three channel arrays back to back, in channel
/// order, each count a little-endian `u32`. There is no header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HistogramRecord {
    channels: [ChannelBins; CHANNELS],
}

impl HistogramRecord {
    pub fn new(channels: [ChannelBins; CHANNELS]) -> Self {
        Self { channels }
    }

    pub fn channels(&self) -> &[ChannelBins; CHANNELS] {
        &self.channels
    }

    pub fn channel(&self, channel: usize) -> Option<&ChannelBins> {
        self.channels.get(channel)
    }

    /// Sum of all bins of one channel (equals the frame's pixel count)
    pub fn channel_total(&self, channel: usize) -> u64 {
        self.channel(channel)
            .map(|bins| bins.iter().map(|&c| c as u64).sum())
            .unwrap_or(0)
    }

    /// Index of the fullest bin; the lowest index wins ties
    pub fn dominant_bin(&self, channel: usize) -> Option<usize> {
        let bins = self.channel(channel)?;
        let max = *bins.iter().max()?;
        if max == 0 {
            return None;
        }
        bins.iter().position(|&c| c == max)
    }

    pub(crate) fn channels_mut(&mut self) -> &mut [ChannelBins; CHANNELS] {
        &mut self.channels
    }

    pub(crate) fn merge(&mut self, other: &HistogramRecord) {
        for (mine, theirs) in self.channels.iter_mut().zip(other.channels.iter()) {
            for (a, b) in mine.iter_mut().zip(theirs.iter()) {
                *a += b;
            }
        }
    }

    /// Serializes into `out`, which must be exactly [`RECORD_SIZE`] bytes.
    pub fn write_to(&self, out: &mut [u8]) -> Result<()> {
        if out.len() != RECORD_SIZE {
            return Err(HistogramError::InvalidRecord {
                message: format!("output slot is {} bytes, expected {}", out.len(), RECORD_SIZE),
            });
        }

        for (slot, count) in out.chunks_exact_mut(4).zip(self.channels.iter().flatten()) {
            slot.copy_from_slice(&count.to_le_bytes());
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut out = [0u8; RECORD_SIZE];
        for (slot, count) in out.chunks_exact_mut(4).zip(self.channels.iter().flatten()) {
            slot.copy_from_slice(&count.to_le_bytes());
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != RECORD_SIZE {
            return Err(HistogramError::InvalidRecord {
                message: format!("record is {} bytes, expected {}", bytes.len(), RECORD_SIZE),
            });
        }

        let mut record = HistogramRecord::default();
        for (i, chunk) in bytes.chunks_exact(4).enumerate() {
            record.channels[i / BINS][i % BINS] = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Ok(record)
    }
}

/// Reads every row of a histogram output column back into records
pub fn parse_histogram_column(column: &Column) -> Result<Vec<HistogramRecord>> {
    column
        .iter()
        .enumerate()
        .map(|(row, element)| {
            let bytes = element.as_bytes().ok_or_else(|| HistogramError::InvalidRecord {
                message: format!("row {} holds a frame, not a histogram buffer", row),
            })?;
            HistogramRecord::from_bytes(bytes)
        })
        .collect()
}
