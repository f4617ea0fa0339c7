use crate::columns::{insert_element, BatchedColumns, Column};
use crate::config::Settings;
use crate::errors::{HistogramError, Result};
use crate::frame::Frame;
use crate::histogram::compute_frame_histogram;
use crate::kernel::{BatchedKernel, DeviceHandle, DeviceType, KernelConfig};
use crate::memory::BlockPool;
use crate::profiler::with_profiler;
use crate::record::RECORD_SIZE;
use crate::registry::{KernelInfo, OpInfo, OpRegistry};
use rayon::prelude::*;
use std::sync::Arc;

pub const HISTOGRAM_OP: &str = "Histogram";
pub const FRAME_INPUT: &str = "frame";
pub const HISTOGRAM_OUTPUT: &str = "histogram";

/// Declares the Histogram op and its CPU kernel
pub fn register(registry: &mut OpRegistry) -> Result<()> {
    registry.register_op(
        OpInfo::new(HISTOGRAM_OP)
            .frame_input(FRAME_INPUT)
            .output(HISTOGRAM_OUTPUT),
    )?;
    registry.register_kernel(
        KernelInfo::new(HISTOGRAM_OP, HistogramKernelCpu::factory)
            .device(DeviceType::Cpu)
            .batch()
            .num_devices(1),
    )?;
    Ok(())
}

/// CPU kernel turning a batch of frames into 192-byte histogram records.
pub struct HistogramKernelCpu {
    device: DeviceHandle,
    settings: Settings,
    pool: Arc<BlockPool>,
}

impl HistogramKernelCpu {
    pub fn new(config: &KernelConfig) -> Result<Self> {
        let device = *config.devices.first().ok_or_else(|| HistogramError::DeviceMismatch {
            op: HISTOGRAM_OP.to_string(),
            device_type: DeviceType::Cpu,
            expected: 1,
            actual: 0,
        })?;

        Ok(Self {
            device,
            settings: config.settings.clone(),
            pool: Arc::clone(&config.pool),
        })
    }

    pub fn factory(config: &KernelConfig) -> Result<Box<dyn BatchedKernel>> {
        Ok(Box::new(Self::new(config)?))
    }
}

/// Checks every row before any output is produced, so one bad frame fails the batch
fn collect_frames(column: &Column) -> Result<Vec<&Frame>> {
    column
        .iter()
        .enumerate()
        .map(|(index, element)| {
            let frame = element.as_frame().ok_or_else(|| HistogramError::InvalidOperation {
                message: format!("row {} of the '{}' column is not a frame", index, FRAME_INPUT),
            })?;
            frame.validate_for_histogram(index)?;
            Ok(frame)
        })
        .collect()
}

fn write_record(frame: &Frame, index: usize, tile_threshold: Option<u64>, slot: &mut [u8]) -> Result<()> {
    let record = compute_frame_histogram(frame, index, tile_threshold)?;
    tracing::trace!(index, "histogram row");
    record.write_to(slot)
}

impl BatchedKernel for HistogramKernelCpu {
    fn execute(&mut self, inputs: &BatchedColumns, outputs: &mut BatchedColumns) -> Result<()> {
        let frame_col = inputs.first().ok_or_else(|| HistogramError::InvalidOperation {
            message: format!("{} expects a '{}' input column", HISTOGRAM_OP, FRAME_INPUT),
        })?;
        if outputs.is_empty() {
            return Err(HistogramError::InvalidOperation {
                message: format!("{} expects a '{}' output column", HISTOGRAM_OP, HISTOGRAM_OUTPUT),
            });
        }

        let frames = collect_frames(frame_col).inspect_err(|e| {
            tracing::warn!(error = %e, "rejecting histogram batch");
        })?;
        let input_count = frames.len();
        if input_count == 0 {
            return Ok(());
        }

        let mut block = self.pool.new_block_buffer(&self.device, RECORD_SIZE * input_count, input_count)?;
        with_profiler(|p| p.start_timer("histogram_batch"));
        let tile_threshold = self
            .settings
            .parallel_frames
            .then_some(self.settings.parallel_tile_threshold);

        // Each frame owns the disjoint RECORD_SIZE slot at its row index
        let result = if self.settings.parallel_frames {
            block
                .as_mut_slice()
                .par_chunks_mut(RECORD_SIZE)
                .zip(frames.par_iter())
                .enumerate()
                .try_for_each(|(index, (slot, frame))| write_record(frame, index, tile_threshold, slot))
        } else {
            block
                .as_mut_slice()
                .chunks_mut(RECORD_SIZE)
                .zip(frames.iter())
                .enumerate()
                .try_for_each(|(index, (slot, frame))| write_record(frame, index, tile_threshold, slot))
        };

        if let Err(e) = result {
            self.pool.release(block);
            with_profiler(|p| p.end_timer("histogram_batch"));
            return Err(e);
        }

        let out_col = &mut outputs[0];
        for record in block.elements() {
            insert_element(out_col, record.to_vec());
        }
        self.pool.release(block);

        let elapsed = with_profiler(|p| {
            p.add_to_counter("frames_processed", input_count as u64);
            p.end_timer("histogram_batch")
        });
        tracing::debug!(
            rows = input_count,
            device = self.device.id,
            parallel = self.settings.parallel_frames,
            elapsed_us = ?elapsed.map(|d| d.as_micros()),
            "histogram batch"
        );

        Ok(())
    }

    fn device(&self) -> DeviceHandle {
        self.device
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::{insert_frame, num_rows};
    use crate::frame::PixelDepth;
    use crate::record::parse_histogram_column;
    use image::{Rgb, RgbImage};

    fn kernel(parallel: bool) -> HistogramKernelCpu {
        let settings = Settings {
            parallel_frames: parallel,
            parallel_tile_threshold: 64,
            ..Settings::default()
        };
        HistogramKernelCpu::new(&KernelConfig::new(vec![DeviceHandle::cpu(0)], settings)).unwrap()
    }

    fn frame_column(colors: &[[u8; 3]]) -> Column {
        let mut column = Column::new();
        for (i, color) in colors.iter().enumerate() {
            let size = 2 + i as u32;
            insert_frame(&mut column, Frame::from_rgb8(RgbImage::from_pixel(size, size, Rgb(*color))));
        }
        column
    }

    fn run(kernel: &mut HistogramKernelCpu, column: Column) -> Result<BatchedColumns> {
        let inputs = vec![column];
        let mut outputs = vec![Column::new()];
        kernel.execute(&inputs, &mut outputs)?;
        Ok(outputs)
    }

    #[test]
    fn test_batch_order_preserved() {
        let colors = [[0, 0, 0], [255, 255, 255], [16, 32, 48], [100, 150, 200]];
        let outputs = run(&mut kernel(true), frame_column(&colors)).unwrap();

        assert_eq!(num_rows(&outputs[0]), colors.len());
        let records = parse_histogram_column(&outputs[0]).unwrap();
        for (i, (record, color)) in records.iter().zip(colors.iter()).enumerate() {
            let pixels = ((2 + i) * (2 + i)) as u64;
            for channel in 0..3 {
                assert_eq!(record.dominant_bin(channel), Some(color[channel] as usize / 16));
                assert_eq!(record.channel_total(channel), pixels);
            }
        }
    }

    #[test]
    fn test_parallel_matches_serial_and_is_idempotent() {
        let mut image = RgbImage::new(40, 30);
        for (x, y, pixel) in image.enumerate_pixels_mut() {
            *pixel = Rgb([(x * 6) as u8, (y * 8) as u8, (x + y) as u8]);
        }
        let mut column = frame_column(&[[1, 2, 3], [200, 100, 50]]);
        insert_frame(&mut column, Frame::from_rgb8(image));

        let parallel = run(&mut kernel(true), column.clone()).unwrap();
        let serial = run(&mut kernel(false), column.clone()).unwrap();
        assert_eq!(parallel, serial);

        let mut k = kernel(true);
        let first = run(&mut k, column.clone()).unwrap();
        let second = run(&mut k, column).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_records_are_record_sized() {
        let outputs = run(&mut kernel(false), frame_column(&[[0, 0, 0]])).unwrap();
        let bytes = outputs[0][0].as_bytes().unwrap();
        assert_eq!(bytes.len(), RECORD_SIZE);
        assert_eq!(&bytes[0..4], &4u32.to_le_bytes());
    }

    #[test]
    fn test_invalid_frame_fails_whole_batch() {
        let mut column = frame_column(&[[1, 1, 1], [2, 2, 2]]);
        insert_frame(&mut column, Frame::new(1, 1, 4, PixelDepth::U8, vec![0; 4]).unwrap());

        let inputs = vec![column];
        let mut outputs = vec![Column::new()];
        let err = kernel(true).execute(&inputs, &mut outputs).unwrap_err();

        match err {
            HistogramError::UnsupportedChannels { index, channels } => {
                assert_eq!(index, 2);
                assert_eq!(channels, 4);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(outputs[0].is_empty());
    }

    #[test]
    fn test_unsupported_depth_and_non_frame_rows() {
        let mut column = Column::new();
        insert_frame(&mut column, Frame::new(1, 1, 3, PixelDepth::F32, vec![0; 12]).unwrap());
        let err = run(&mut kernel(false), column).unwrap_err();
        assert_eq!(err.error_code(), "UNSUPPORTED_DEPTH");

        let mut column = Column::new();
        insert_element(&mut column, vec![1, 2, 3]);
        let err = run(&mut kernel(false), column).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_OPERATION");
    }

    #[test]
    fn test_empty_batch() {
        let outputs = run(&mut kernel(true), Column::new()).unwrap();
        assert!(outputs[0].is_empty());
    }

    #[test]
    fn test_missing_columns() {
        let mut k = kernel(true);
        let mut outputs = vec![Column::new()];
        assert!(k.execute(&Vec::new(), &mut outputs).is_err());

        let inputs = vec![frame_column(&[[0, 0, 0]])];
        assert!(k.execute(&inputs, &mut Vec::new()).is_err());
    }

    #[test]
    fn test_allocation_failure_propagates() {
        let config = KernelConfig::new(vec![DeviceHandle::cpu(0)], Settings::default())
            .with_pool(Arc::new(BlockPool::new(0)));
        let mut k = HistogramKernelCpu::new(&config).unwrap();

        let inputs = vec![frame_column(&[[0, 0, 0]])];
        let mut outputs = vec![Column::new()];
        with_profiler(|p| p.reset());
        let err = k.execute(&inputs, &mut outputs).unwrap_err();
        assert_eq!(err.error_code(), "ALLOCATION_FAILED");
        assert!(outputs[0].is_empty());

        // A failed allocation never starts the batch timer
        let stats = with_profiler(|p| p.get_stats());
        assert!(!stats.measurements.contains_key("histogram_batch"));
        assert!(with_profiler(|p| p.end_timer("histogram_batch")).is_none());

        run(&mut kernel(false), frame_column(&[[0, 0, 0]])).unwrap();
        let stats = with_profiler(|p| p.get_stats());
        assert_eq!(stats.measurements["histogram_batch"].count, 1);
    }

    #[test]
    fn test_blocks_return_to_pool() {
        let pool = Arc::new(BlockPool::default());
        let config = KernelConfig::new(vec![DeviceHandle::cpu(3)], Settings::default()).with_pool(Arc::clone(&pool));
        let mut k = HistogramKernelCpu::new(&config).unwrap();
        assert_eq!(k.device(), DeviceHandle::cpu(3));

        run(&mut k, frame_column(&[[0, 0, 0], [9, 9, 9]])).unwrap();
        run(&mut k, frame_column(&[[0, 0, 0]])).unwrap();

        let stats = pool.stats();
        assert_eq!(stats.allocations, 1);
        assert_eq!(stats.reuses, 1);
        assert_eq!(stats.pooled_buffers, 1);
    }

    #[test]
    fn test_profiler_counts_frames() {
        with_profiler(|p| p.reset());
        run(&mut kernel(false), frame_column(&[[0, 0, 0], [1, 1, 1], [2, 2, 2]])).unwrap();

        let frames = with_profiler(|p| p.counter("frames_processed"));
        assert_eq!(frames, 3);
        let stats = with_profiler(|p| p.get_stats());
        assert_eq!(stats.measurements["histogram_batch"].count, 1);
    }

    #[test]
    fn test_kernel_requires_a_device() {
        let config = KernelConfig::new(Vec::new(), Settings::default());
        assert!(HistogramKernelCpu::new(&config).is_err());
    }
}
