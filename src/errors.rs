use crate::frame::PixelDepth;
use crate::kernel::DeviceType;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HistogramError {
    #[error("Frame {index} has {channels} channels, expected 3")]
    UnsupportedChannels { index: usize, channels: u32 },

    #[error("Frame {index} has unsupported pixel depth {depth:?}, expected 8-bit samples")]
    UnsupportedDepth { index: usize, depth: PixelDepth },

    #[error("Frame {index} has {pixels} pixels, more than a 32-bit bin can count")]
    FrameTooLarge { index: usize, pixels: u64 },

    #[error("Frame buffer is {actual} bytes, expected {expected} for {width}x{height}")]
    FrameSizeMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid histogram record: {message}")]
    InvalidRecord { message: String },

    #[error("Block allocation of {requested} bytes failed: {message}")]
    AllocationFailed { requested: usize, message: String },

    #[error("Unknown op: {name}")]
    UnknownOp { name: String },

    #[error("No kernel registered for op '{op}' on {device_type:?}")]
    NoKernel { op: String, device_type: DeviceType },

    #[error("Op '{op}' expects {expected} {device_type:?} device(s), got {actual}")]
    DeviceMismatch {
        op: String,
        device_type: DeviceType,
        expected: usize,
        actual: usize,
    },

    #[error("Duplicate registration: {name}")]
    DuplicateRegistration { name: String },

    #[error("Failed to load image '{path}': {message}")]
    ImageLoadError { path: PathBuf, message: String },

    #[error("Settings error: {message}")]
    SettingsError { message: String },

    #[error("IO error: {source}")]
    IoError {
        #[from]
        source: std::io::Error,
    },

    #[error("JSON parsing error: {source}")]
    JsonError {
        #[from]
        source: serde_json::Error,
    },

    #[error("Invalid operation: {message}")]
    InvalidOperation { message: String },
}

pub type Result<T> = std::result::Result<T, HistogramError>;

impl HistogramError {
    /// Returns true if retrying the same call could succeed.
    /// The operator itself is a pure transform, so only I/O-level failures qualify.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            HistogramError::IoError { .. } | HistogramError::ImageLoadError { .. }
        )
    }

    /// Returns true if the error stems from a malformed frame or record
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            HistogramError::UnsupportedChannels { .. }
                | HistogramError::UnsupportedDepth { .. }
                | HistogramError::FrameTooLarge { .. }
                | HistogramError::FrameSizeMismatch { .. }
                | HistogramError::InvalidRecord { .. }
                | HistogramError::InvalidOperation { .. }
        )
    }

    /// Returns the error message followed by a hint for the caller
    pub fn user_message(&self) -> String {
        let base_message = self.to_string();
        let suggestion = match self {
            HistogramError::UnsupportedChannels { .. } => "Convert frames to 3-channel RGB before running the Histogram op.",
            HistogramError::UnsupportedDepth { .. } => "Convert frames to 8 bits per sample before running the Histogram op.",
            HistogramError::FrameTooLarge { .. } => "Downscale or split the frame; bin counts are 32-bit.",
            HistogramError::FrameSizeMismatch { .. } => "The frame buffer does not match its declared dimensions. Check the decoder output.",
            HistogramError::InvalidRecord { .. } => "Histogram records are exactly 192 bytes. The column may hold output from a different op.",
            HistogramError::AllocationFailed { .. } => "Raise the block pool limit or submit smaller batches.",
            HistogramError::UnknownOp { .. } | HistogramError::NoKernel { .. } => "Check the op name against the registry.",
            HistogramError::DeviceMismatch { .. } => "The Histogram kernel runs on exactly one CPU device.",
            HistogramError::ImageLoadError { .. } => "The image file may be corrupted or in an unsupported format.",
            HistogramError::IoError { .. } => "File system error occurred. Check paths and permissions.",
            _ => "An unexpected error occurred.",
        };

        format!("{}\n\n{}", base_message, suggestion)
    }

    /// Returns an error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            HistogramError::UnsupportedChannels { .. } => "UNSUPPORTED_CHANNELS",
            HistogramError::UnsupportedDepth { .. } => "UNSUPPORTED_DEPTH",
            HistogramError::FrameTooLarge { .. } => "FRAME_TOO_LARGE",
            HistogramError::FrameSizeMismatch { .. } => "FRAME_SIZE_MISMATCH",
            HistogramError::InvalidRecord { .. } => "INVALID_RECORD",
            HistogramError::AllocationFailed { .. } => "ALLOCATION_FAILED",
            HistogramError::UnknownOp { .. } => "UNKNOWN_OP",
            HistogramError::NoKernel { .. } => "NO_KERNEL",
            HistogramError::DeviceMismatch { .. } => "DEVICE_MISMATCH",
            HistogramError::DuplicateRegistration { .. } => "DUPLICATE_REGISTRATION",
            HistogramError::ImageLoadError { .. } => "IMAGE_LOAD_ERROR",
            HistogramError::SettingsError { .. } => "SETTINGS_ERROR",
            HistogramError::IoError { .. } => "IO_ERROR",
            HistogramError::JsonError { .. } => "JSON_ERROR",
            HistogramError::InvalidOperation { .. } => "INVALID_OPERATION",
        }
    }

    /// Logs the error with its code
    pub fn log_and_report(&self) {
        let error_code = self.error_code();

        if matches!(self, HistogramError::AllocationFailed { .. }) {
            tracing::error!(code = error_code, "{}", self);
        } else {
            tracing::warn!(code = error_code, "{}", self);
        }
    }
}
