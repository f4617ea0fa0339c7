use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Timers and counters for kernel executions on the current thread
#[derive(Debug, Default)]
pub struct Profiler {
    timers: HashMap<String, Instant>,
    measurements: HashMap<String, Vec<Duration>>,
    counters: HashMap<String, u64>,
}

impl Profiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_timer(&mut self, name: &str) {
        tracing::trace!(timer = name, "start_timer");
        self.timers.insert(name.to_string(), Instant::now());
    }

    /// Stops a running timer and returns the elapsed time
    pub fn end_timer(&mut self, name: &str) -> Option<Duration> {
        let start = self.timers.remove(name)?;
        let duration = start.elapsed();
        tracing::trace!(timer = name, duration_us = ?duration.as_micros(), "end_timer");
        self.measurements.entry(name.to_string())
            .or_default()
            .push(duration);
        Some(duration)
    }

    pub fn add_to_counter(&mut self, name: &str, amount: u64) {
        *self.counters.entry(name.to_string()).or_insert(0) += amount;
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn get_stats(&self) -> ProfilerStats {
        let mut stats = HashMap::new();

        for (name, measurements) in &self.measurements {
            let (Some(min), Some(max)) = (measurements.iter().min(), measurements.iter().max()) else {
                continue;
            };
            let total: Duration = measurements.iter().sum();
            let avg = total / measurements.len() as u32;

            stats.insert(name.clone(), MeasurementStats {
                count: measurements.len(),
                total_time: total,
                average_time: avg,
                min_time: *min,
                max_time: *max,
            });
        }

        ProfilerStats {
            measurements: stats,
            counters: self.counters.clone(),
        }
    }

    pub fn reset(&mut self) {
        self.timers.clear();
        self.measurements.clear();
        self.counters.clear();
    }
}

#[derive(Debug, Clone)]
pub struct MeasurementStats {
    pub count: usize,
    pub total_time: Duration,
    pub average_time: Duration,
    pub min_time: Duration,
    pub max_time: Duration,
}

#[derive(Debug, Clone)]
pub struct ProfilerStats {
    pub measurements: HashMap<String, MeasurementStats>,
    pub counters: HashMap<String, u64>,
}

use std::cell::RefCell;
use std::thread_local;

thread_local! {
    static PROFILER: RefCell<Profiler> = RefCell::new(Profiler::new());
}

pub fn with_profiler<F, R>(f: F) -> R
where
    F: FnOnce(&mut Profiler) -> R,
{
    PROFILER.with(|p| f(&mut p.borrow_mut()))
}
