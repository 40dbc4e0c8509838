//! Mock source drivers for isolated engine testing

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use vigil_engine::error::{DriverError, DriverResult};
use vigil_engine::{Reading, SourceClass, SourceDriver};

/// Driver that replays a fixed queue of readings, then goes quiet
///
/// Once the queue drains, `poll` returns `Ok(None)` so the sampling
/// task keeps ticking without producing further data.
pub struct ScriptedDriver {
    queue: Mutex<VecDeque<Reading>>,
}

impl ScriptedDriver {
    pub fn new(readings: Vec<Reading>) -> Self {
        Self {
            queue: Mutex::new(readings.into()),
        }
    }

    /// A script of `count` readings carrying a gapless `seq` parameter,
    /// used to detect lost or duplicated writes
    pub fn sequence(subject_id: &str, source_id: &str, count: usize) -> Self {
        let readings = (0..count)
            .map(|i| {
                Reading::new(subject_id, source_id, SourceClass::PulseOximeter)
                    .with_parameter("seq", i as f64)
            })
            .collect();
        Self::new(readings)
    }
}

#[async_trait]
impl SourceDriver for ScriptedDriver {
    async fn poll(&self) -> DriverResult<Option<Reading>> {
        let mut queue = self.queue.lock().unwrap();
        Ok(queue.pop_front())
    }
}

/// Driver that always produces a clone of one reading
pub struct ConstantDriver {
    reading: Reading,
}

impl ConstantDriver {
    pub fn new(reading: Reading) -> Self {
        Self { reading }
    }
}

#[async_trait]
impl SourceDriver for ConstantDriver {
    async fn poll(&self) -> DriverResult<Option<Reading>> {
        Ok(Some(
            self.reading.clone().with_timestamp(chrono::Utc::now()),
        ))
    }
}

/// Driver that fails a number of polls before recovering
pub struct FlakyDriver {
    failures_remaining: AtomicU64,
    reading: Reading,
    polls: AtomicU64,
}

impl FlakyDriver {
    pub fn new(failures: u64, reading: Reading) -> Self {
        Self {
            failures_remaining: AtomicU64::new(failures),
            reading,
            polls: AtomicU64::new(0),
        }
    }

    pub fn poll_count(&self) -> u64 {
        self.polls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SourceDriver for FlakyDriver {
    async fn poll(&self) -> DriverResult<Option<Reading>> {
        self.polls.fetch_add(1, Ordering::Relaxed);
        let remaining = self.failures_remaining.load(Ordering::Relaxed);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::Relaxed);
            return Err(DriverError::Acquisition {
                reason: "simulated outage".to_string(),
            });
        }
        Ok(Some(
            self.reading.clone().with_timestamp(chrono::Utc::now()),
        ))
    }
}

/// Driver that never produces anything
pub struct SilentDriver;

#[async_trait]
impl SourceDriver for SilentDriver {
    async fn poll(&self) -> DriverResult<Option<Reading>> {
        Ok(None)
    }
}
