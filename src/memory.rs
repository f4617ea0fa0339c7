use crate::errors::{HistogramError, Result};
use crate::kernel::{DeviceHandle, DeviceType};
use std::sync::{Mutex, PoisonError};

/// Maximum number of free blocks kept per size class
const MAX_POOLED_PER_CLASS: usize = 10;

/// A zeroed output block holding `count` fixed-size elements.
#[derive(Debug)]
pub struct BlockBuffer {
    data: Vec<u8>,
    len: usize,
    count: usize,
    device: DeviceHandle,
}

impl BlockBuffer {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn device(&self) -> DeviceHandle {
        self.device
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data[..self.len]
    }

    /// Iterates the block as `count` equally sized element slices
    pub fn elements(&self) -> impl Iterator<Item = &[u8]> {
        let element_size = if self.count == 0 { 0 } else { self.len / self.count };
        self.as_slice().chunks_exact(element_size.max(1)).take(self.count)
    }
}

/// Size-classed pool of output blocks for one host process.
#[derive(Debug)]
pub struct BlockPool {
    pools: Vec<Mutex<Vec<Vec<u8>>>>,
    size_classes: Vec<usize>,
    limit_bytes: usize,
    stats: Mutex<PoolCounters>,
}

#[derive(Debug, Default, Clone, Copy)]
struct PoolCounters {
    allocations: u64,
    reuses: u64,
}

impl BlockPool {
    pub fn new(limit_mb: usize) -> Self {
        // Size classes for typical histogram batches (192 bytes per frame)
        let size_classes = vec![
            4 * 1024,         // 4KB, ~20 frames
            64 * 1024,        // 64KB
            1024 * 1024,      // 1MB
            16 * 1024 * 1024, // 16MB
        ];

        let pools = size_classes.iter().map(|_| Mutex::new(Vec::new())).collect();

        Self {
            pools,
            size_classes,
            limit_bytes: limit_mb.saturating_mul(1024 * 1024),
            stats: Mutex::new(PoolCounters::default()),
        }
    }

    pub fn limit_bytes(&self) -> usize {
        self.limit_bytes
    }

    /// Allocates a zeroed block of `size` bytes for `count` elements on `device`.
    pub fn new_block_buffer(&self, device: &DeviceHandle, size: usize, count: usize) -> Result<BlockBuffer> {
        if device.device_type != DeviceType::Cpu {
            return Err(HistogramError::AllocationFailed {
                requested: size,
                message: format!("block pool only serves CPU memory, got {:?}", device.device_type),
            });
        }
        if size > self.limit_bytes {
            return Err(HistogramError::AllocationFailed {
                requested: size,
                message: format!("request exceeds pool limit of {} bytes", self.limit_bytes),
            });
        }
        if count > 0 && size % count != 0 {
            return Err(HistogramError::AllocationFailed {
                requested: size,
                message: format!("{} bytes cannot hold {} equal elements", size, count),
            });
        }

        let data = self.take_pooled(size).unwrap_or_else(|| {
            self.bump(|c| c.allocations += 1);
            vec![0; size]
        });

        Ok(BlockBuffer {
            data,
            len: size,
            count,
            device: *device,
        })
    }

    fn take_pooled(&self, size: usize) -> Option<Vec<u8>> {
        for (i, &class_size) in self.size_classes.iter().enumerate() {
            if size <= class_size {
                let mut pool = self.pools[i].lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(mut buffer) = pool.pop() {
                    if buffer.len() < size {
                        buffer.resize(size, 0);
                    } else {
                        buffer[..size].fill(0);
                    }
                    drop(pool);
                    self.bump(|c| c.reuses += 1);
                    return Some(buffer);
                }
            }
        }
        None
    }

    /// Returns a block to its size class for reuse
    pub fn release(&self, block: BlockBuffer) {
        let buffer = block.data;

        for (i, &class_size) in self.size_classes.iter().enumerate() {
            if buffer.len() <= class_size {
                let mut pool = self.pools[i].lock().unwrap_or_else(PoisonError::into_inner);
                // Limit pool size to prevent unbounded growth
                if pool.len() < MAX_POOLED_PER_CLASS {
                    pool.push(buffer);
                }
                return;
            }
        }

        // Too large for any class, just drop it
    }

    fn bump(&self, f: impl FnOnce(&mut PoolCounters)) {
        let mut counters = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut *counters);
    }

    pub fn stats(&self) -> BlockPoolStats {
        let mut pooled_buffers = 0;
        let mut pooled_bytes = 0;

        for pool in &self.pools {
            let pool = pool.lock().unwrap_or_else(PoisonError::into_inner);
            pooled_buffers += pool.len();
            pooled_bytes += pool.iter().map(|b| b.len()).sum::<usize>();
        }

        let counters = *self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        BlockPoolStats {
            pooled_buffers,
            pooled_memory_mb: pooled_bytes as f64 / (1024.0 * 1024.0),
            allocations: counters.allocations,
            reuses: counters.reuses,
        }
    }
}

impl Default for BlockPool {
    fn default() -> Self {
        Self::new(256)
    }
}

#[derive(Debug, Clone)]
pub struct BlockPoolStats {
    pub pooled_buffers: usize,
    pub pooled_memory_mb: f64,
    pub allocations: u64,
    pub reuses: u64,
}
