//! Alerting integration tests: threshold tie-breaks, multi-parameter
//! readings, acknowledgement flow, and evaluation-failure tolerance.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::time::sleep;

use vigil_engine::{DriverRegistry, MonitoringEngine, Reading, Severity, SourceClass};
use vigil_tests::mocks::ConstantDriver;
use vigil_tests::{fast_config, init_test_environment};

fn constant_driver_for(class: SourceClass, reading: Reading) -> DriverRegistry {
    DriverRegistry::simulated()
        .with_factory(class, Arc::new(move |_| Box::new(ConstantDriver::new(reading.clone()))))
}

async fn engine_with_constant(
    class: SourceClass,
    class_name: &str,
    reading: Reading,
) -> Result<MonitoringEngine> {
    let engine = MonitoringEngine::builder(fast_config())
        .drivers(constant_driver_for(class, reading))
        .build()?;
    engine.register_source("s1", class_name, "p1").await?;
    engine.start("p1").await?;
    Ok(engine)
}

#[tokio::test]
async fn test_overlapping_boundaries_emit_single_critical() -> Result<()> {
    init_test_environment();
    // SpO2 80 breaches both the critical (<85) and high (<88) boundaries
    let reading = Reading::new("p1", "s1", SourceClass::PulseOximeter)
        .with_parameter("spo2", 80.0);
    let engine =
        engine_with_constant(SourceClass::PulseOximeter, "pulse_oximeter", reading).await?;

    sleep(Duration::from_millis(100)).await;
    engine.stop("p1").await;

    let status = engine.status("p1").await?;
    assert!(!status.recent_alerts.is_empty());
    for alert in &status.recent_alerts {
        assert_eq!(alert.severity, Severity::Critical);
        assert_eq!(alert.source_id, "s1");
    }

    // one alert per reading, not two
    let stats = engine.statistics().await;
    assert_eq!(
        engine.metrics().counters().alerts_raised.get(),
        stats.total_readings
    );
    Ok(())
}

#[tokio::test]
async fn test_multi_parameter_reading_alerts_per_parameter() -> Result<()> {
    init_test_environment();
    let reading = Reading::new("p1", "s1", SourceClass::PulseOximeter)
        .with_parameter("heart_rate", 200.0)
        .with_parameter("temperature", 103.0);
    let engine =
        engine_with_constant(SourceClass::PulseOximeter, "pulse_oximeter", reading).await?;

    sleep(Duration::from_millis(100)).await;
    engine.stop("p1").await;

    // every reading produced exactly two alerts
    let stats = engine.statistics().await;
    assert_eq!(
        engine.metrics().counters().alerts_raised.get(),
        stats.total_readings * 2
    );

    let status = engine.status("p1").await?;
    assert!(status.recent_alerts.len() >= 2);

    // the newest two alerts come from the same reading
    let newest = &status.recent_alerts[0];
    let second = &status.recent_alerts[1];
    assert_eq!(newest.reading.timestamp, second.reading.timestamp);

    let severities: Vec<Severity> = status
        .recent_alerts
        .iter()
        .take(2)
        .map(|a| a.severity)
        .collect();
    assert!(severities.contains(&Severity::High)); // tachycardia
    assert!(severities.contains(&Severity::Medium)); // fever
    Ok(())
}

#[tokio::test]
async fn test_acknowledge_flow() -> Result<()> {
    init_test_environment();
    // systolic 190 breaches the >180 boundary
    let reading = Reading::new("p1", "s1", SourceClass::BloodPressure)
        .with_parameter("systolic_bp", 190.0);
    let engine =
        engine_with_constant(SourceClass::BloodPressure, "blood_pressure", reading).await?;

    sleep(Duration::from_millis(100)).await;
    engine.stop("p1").await;

    let status = engine.status("p1").await?;
    let alert = &status.recent_alerts[0];
    assert_eq!(alert.severity, Severity::High);
    assert!(alert.message.contains("180"));
    assert!(!alert.acknowledged);

    assert!(engine.acknowledge(&alert.id, "nurse1").await);
    // already-acknowledged is still a success
    assert!(engine.acknowledge(&alert.id, "nurse2").await);

    let status = engine.status("p1").await?;
    let reacked = status
        .recent_alerts
        .iter()
        .find(|a| a.id == alert.id)
        .expect("acknowledged alert still listed while unresolved");
    assert!(reacked.acknowledged);
    assert_eq!(reacked.acknowledged_by.as_deref(), Some("nurse1"));
    Ok(())
}

#[tokio::test]
async fn test_unacknowledged_statistics() -> Result<()> {
    init_test_environment();
    let reading = Reading::new("p1", "s1", SourceClass::BloodPressure)
        .with_parameter("systolic_bp", 190.0);
    let engine =
        engine_with_constant(SourceClass::BloodPressure, "blood_pressure", reading).await?;

    sleep(Duration::from_millis(60)).await;
    engine.stop("p1").await;

    let before = engine.statistics().await;
    assert!(before.unacknowledged_alerts > 0);

    let status = engine.status("p1").await?;
    engine.acknowledge(&status.recent_alerts[0].id, "nurse1").await;

    let after = engine.statistics().await;
    assert_eq!(after.unacknowledged_alerts, before.unacknowledged_alerts - 1);
    Ok(())
}

#[tokio::test]
async fn test_evaluation_failure_still_stores_reading() -> Result<()> {
    init_test_environment();
    // NaN fails evaluation; storage must succeed anyway
    let reading = Reading::new("p1", "s1", SourceClass::Glucose)
        .with_parameter("glucose", f64::NAN);
    let engine = engine_with_constant(SourceClass::Glucose, "glucose", reading).await?;

    sleep(Duration::from_millis(100)).await;
    engine.stop("p1").await;

    let status = engine.status("p1").await?;
    assert!(!status.trend.is_empty(), "reading was not stored");
    assert!(status.recent_alerts.is_empty(), "no alert may be emitted");
    assert!(engine.metrics().counters().evaluation_failures.get() >= 1);

    // the engine and its other operations stay healthy
    assert_eq!(engine.health().await.status, "healthy");
    Ok(())
}

#[tokio::test]
async fn test_healthy_readings_never_alert() -> Result<()> {
    init_test_environment();
    let reading = Reading::new("p1", "s1", SourceClass::PulseOximeter)
        .with_parameter("spo2", 98.0)
        .with_parameter("heart_rate", 72.0);
    let engine =
        engine_with_constant(SourceClass::PulseOximeter, "pulse_oximeter", reading).await?;

    sleep(Duration::from_millis(80)).await;
    engine.stop("p1").await;

    let status = engine.status("p1").await?;
    assert!(status.trend.len() >= 2);
    assert_eq!(status.active_alerts, 0);
    assert!(status.recent_alerts.is_empty());
    Ok(())
}
