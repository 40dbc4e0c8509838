//! Source drivers
//!
//! A driver is the reading-acquisition capability for one source. It
//! owns no shared state; the sampling task calls `poll` on the source's
//! cadence. The built-in simulated drivers generate jittered baselines
//! per class so the engine can run without any hardware attached.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;

use crate::error::DriverResult;
use crate::types::{parameters, Reading, SourceClass};

/// Identity handed to a driver factory when a source starts
#[derive(Debug, Clone)]
pub struct SourceDescriptor {
    pub source_id: String,
    pub subject_id: String,
    pub class: SourceClass,
}

/// Reading-acquisition capability for one source
///
/// `Ok(None)` means "no sample this cycle" (warming up, duty-cycled);
/// the sampling task just waits for the next cadence tick. `Err` is a
/// transient acquisition failure, retried after a fixed backoff.
#[async_trait]
pub trait SourceDriver: Send + Sync {
    async fn poll(&self) -> DriverResult<Option<Reading>>;
}

/// Builds a driver for a starting source
pub type DriverFactory =
    Arc<dyn Fn(&SourceDescriptor) -> Box<dyn SourceDriver> + Send + Sync>;

/// Per-class driver factories, defaulting to the simulated drivers
pub struct DriverRegistry {
    factories: HashMap<SourceClass, DriverFactory>,
}

impl DriverRegistry {
    /// A registry serving simulated drivers for every class
    pub fn simulated() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Override the factory for one class
    pub fn with_factory(mut self, class: SourceClass, factory: DriverFactory) -> Self {
        self.factories.insert(class, factory);
        self
    }

    /// Build a driver for a source, falling back to the class's
    /// simulated driver when no override is installed
    pub fn create(&self, descriptor: &SourceDescriptor) -> Box<dyn SourceDriver> {
        match self.factories.get(&descriptor.class) {
            Some(factory) => factory(descriptor),
            None => simulated_driver(descriptor),
        }
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::simulated()
    }
}

/// Simulated driver for a class
pub fn simulated_driver(descriptor: &SourceDescriptor) -> Box<dyn SourceDriver> {
    match descriptor.class {
        SourceClass::PulseOximeter => Box::new(PulseOximeterDriver::new(descriptor.clone())),
        SourceClass::BloodPressure => Box::new(BloodPressureDriver::new(descriptor.clone())),
        SourceClass::Temperature => Box::new(TemperatureDriver::new(descriptor.clone())),
        SourceClass::Respiratory => Box::new(RespiratoryDriver::new(descriptor.clone())),
        SourceClass::Glucose => Box::new(GlucoseDriver::new(descriptor.clone())),
    }
}

fn jitter(spread: f64) -> f64 {
    rand::thread_rng().gen_range(-spread..=spread)
}

/// Simulated pulse oximeter: SpO2 plus heart rate
pub struct PulseOximeterDriver {
    descriptor: SourceDescriptor,
    baseline_spo2: f64,
    baseline_hr: f64,
}

impl PulseOximeterDriver {
    pub fn new(descriptor: SourceDescriptor) -> Self {
        Self {
            descriptor,
            baseline_spo2: 98.0,
            baseline_hr: 72.0,
        }
    }
}

#[async_trait]
impl SourceDriver for PulseOximeterDriver {
    async fn poll(&self) -> DriverResult<Option<Reading>> {
        let spo2 = (self.baseline_spo2 + jitter(1.0)).clamp(85.0, 100.0);
        let heart_rate = (self.baseline_hr + jitter(6.0)).clamp(50.0, 150.0);

        let reading = Reading::new(
            &self.descriptor.subject_id,
            &self.descriptor.source_id,
            self.descriptor.class,
        )
        .with_parameter(parameters::SPO2, (spo2 * 10.0).round() / 10.0)
        .with_parameter(parameters::HEART_RATE, heart_rate.round());

        Ok(Some(reading))
    }
}

/// Simulated blood pressure monitor, slightly elevated baseline
pub struct BloodPressureDriver {
    descriptor: SourceDescriptor,
    baseline_systolic: f64,
    baseline_diastolic: f64,
}

impl BloodPressureDriver {
    pub fn new(descriptor: SourceDescriptor) -> Self {
        Self {
            descriptor,
            baseline_systolic: 132.0,
            baseline_diastolic: 88.0,
        }
    }
}

#[async_trait]
impl SourceDriver for BloodPressureDriver {
    async fn poll(&self) -> DriverResult<Option<Reading>> {
        let systolic = (self.baseline_systolic + jitter(8.0)).clamp(80.0, 200.0);
        let diastolic = (self.baseline_diastolic + jitter(5.0)).clamp(50.0, 120.0);

        let reading = Reading::new(
            &self.descriptor.subject_id,
            &self.descriptor.source_id,
            self.descriptor.class,
        )
        .with_parameter(parameters::SYSTOLIC_BP, systolic.round())
        .with_parameter(parameters::DIASTOLIC_BP, diastolic.round());

        Ok(Some(reading))
    }
}

/// Simulated skin temperature sensor
pub struct TemperatureDriver {
    descriptor: SourceDescriptor,
    baseline_temp: f64, // Fahrenheit
}

impl TemperatureDriver {
    pub fn new(descriptor: SourceDescriptor) -> Self {
        Self {
            descriptor,
            baseline_temp: 98.6,
        }
    }
}

#[async_trait]
impl SourceDriver for TemperatureDriver {
    async fn poll(&self) -> DriverResult<Option<Reading>> {
        let temp = (self.baseline_temp + jitter(0.5)).clamp(95.0, 105.0);

        let reading = Reading::new(
            &self.descriptor.subject_id,
            &self.descriptor.source_id,
            self.descriptor.class,
        )
        .with_parameter(parameters::TEMPERATURE, (temp * 10.0).round() / 10.0);

        Ok(Some(reading))
    }
}

/// Simulated respiratory rate monitor
pub struct RespiratoryDriver {
    descriptor: SourceDescriptor,
    baseline_rate: f64,
}

impl RespiratoryDriver {
    pub fn new(descriptor: SourceDescriptor) -> Self {
        Self {
            descriptor,
            baseline_rate: 16.0,
        }
    }
}

#[async_trait]
impl SourceDriver for RespiratoryDriver {
    async fn poll(&self) -> DriverResult<Option<Reading>> {
        let rate = (self.baseline_rate + jitter(3.0)).clamp(8.0, 40.0);

        let reading = Reading::new(
            &self.descriptor.subject_id,
            &self.descriptor.source_id,
            self.descriptor.class,
        )
        .with_parameter(parameters::RESPIRATORY_RATE, rate.round());

        Ok(Some(reading))
    }
}

/// Simulated glucose monitor
pub struct GlucoseDriver {
    descriptor: SourceDescriptor,
    baseline_glucose: f64,
}

impl GlucoseDriver {
    pub fn new(descriptor: SourceDescriptor) -> Self {
        Self {
            descriptor,
            baseline_glucose: 100.0,
        }
    }
}

#[async_trait]
impl SourceDriver for GlucoseDriver {
    async fn poll(&self) -> DriverResult<Option<Reading>> {
        let glucose = (self.baseline_glucose + jitter(12.0)).clamp(40.0, 400.0);

        let reading = Reading::new(
            &self.descriptor.subject_id,
            &self.descriptor.source_id,
            self.descriptor.class,
        )
        .with_parameter(parameters::GLUCOSE, glucose.round());

        Ok(Some(reading))
    }
}
