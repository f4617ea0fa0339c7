//! Per-frame color histogram operator for batched video pipelines.
//!
//! Each frame of a batch is binned into 16 intensity bins per RGB channel
//! and emitted as a flat 192-byte record at the same row index.

pub mod columns;
pub mod config;
pub mod errors;
pub mod frame;
pub mod histogram;
pub mod kernel;
pub mod logging;
pub mod memory;
pub mod ops;
pub mod profiler;
pub mod record;
pub mod registry;

pub use columns::{insert_element, insert_frame, num_rows, BatchedColumns, Column, Element};
pub use config::Settings;
pub use errors::{HistogramError, Result};
pub use frame::{load_frame, Frame, PixelDepth};
pub use kernel::{BatchedKernel, DeviceHandle, DeviceType, KernelConfig};
pub use memory::BlockPool;
pub use ops::{HistogramKernelCpu, HISTOGRAM_OP};
pub use record::{parse_histogram_column, HistogramRecord, BINS, CHANNELS, RECORD_SIZE};
pub use registry::OpRegistry;
