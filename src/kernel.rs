use crate::columns::BatchedColumns;
use crate::config::Settings;
use crate::errors::Result;
use crate::memory::BlockPool;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceType {
    Cpu,
    Gpu,
}

/// A concrete device a kernel instance is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle {
    pub device_type: DeviceType,
    pub id: u32,
}

impl DeviceHandle {
    pub fn cpu(id: u32) -> Self {
        Self {
            device_type: DeviceType::Cpu,
            id,
        }
    }

    pub fn gpu(id: u32) -> Self {
        Self {
            device_type: DeviceType::Gpu,
            id,
        }
    }
}

/// Everything a kernel receives at construction time.
#[derive(Debug, Clone)]
pub struct KernelConfig {
    pub devices: Vec<DeviceHandle>,
    pub settings: Settings,
    pub pool: Arc<BlockPool>,
}

impl KernelConfig {
    /// Builds a config with its own block pool sized from `settings`
    pub fn new(devices: Vec<DeviceHandle>, settings: Settings) -> Self {
        let pool = Arc::new(BlockPool::new(settings.pool_limit_mb));
        Self {
            devices,
            settings,
            pool,
        }
    }

    pub fn with_pool(mut self, pool: Arc<BlockPool>) -> Self {
        self.pool = pool;
        self
    }
}

/// A kernel that transforms one batch of input columns into output rows.
///
/// Implementations append exactly one output row per input row to each
/// output column, and append nothing when they return an error.
pub trait BatchedKernel: Send {
    fn execute(&mut self, inputs: &BatchedColumns, outputs: &mut BatchedColumns) -> Result<()>;

    fn device(&self) -> DeviceHandle;
}
