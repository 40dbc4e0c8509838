//! Concurrency integration tests: many writers against one subject's
//! rolling history and the global alert log, with no lost or duplicated
//! writes and FIFO eviction preserved.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::time::sleep;

use vigil_engine::{DriverRegistry, MonitoringEngine, Reading, RollingStore, SourceClass};
use vigil_tests::mocks::ScriptedDriver;
use vigil_tests::{fast_config, init_test_environment};

fn sequenced_reading(subject: &str, source: &str, seq: usize) -> Reading {
    Reading::new(subject, source, SourceClass::PulseOximeter)
        .with_parameter("seq", seq as f64)
}

/// Group the retained readings by source and check each source's `seq`
/// values are consecutive and in arrival order
fn assert_gapless_per_source(readings: &[Reading]) {
    use std::collections::HashMap;

    let mut last_seen: HashMap<&str, f64> = HashMap::new();
    for reading in readings {
        let seq = reading.parameter("seq").unwrap();
        if let Some(prev) = last_seen.get(reading.source_id.as_str()) {
            assert_eq!(
                seq,
                prev + 1.0,
                "gap in sequence for source {}",
                reading.source_id
            );
        }
        last_seen.insert(reading.source_id.as_str(), seq);
    }
}

#[tokio::test]
async fn test_store_no_lost_writes_under_concurrency() -> Result<()> {
    init_test_environment();
    const WRITERS: usize = 8;
    const PER_WRITER: usize = 500;

    let store = Arc::new(RollingStore::new(WRITERS * PER_WRITER, 100));

    let handles: Vec<_> = (0..WRITERS)
        .map(|w| {
            let store = store.clone();
            tokio::spawn(async move {
                let source = format!("s{}", w);
                for seq in 0..PER_WRITER {
                    store
                        .append_reading(sequenced_reading("p1", &source, seq))
                        .await;
                }
            })
        })
        .collect();

    for joined in futures::future::join_all(handles).await {
        joined?;
    }

    assert_eq!(store.history_len("p1").await, WRITERS * PER_WRITER);
    let all = store.recent_readings("p1", WRITERS * PER_WRITER).await;
    assert_gapless_per_source(&all);
    Ok(())
}

#[tokio::test]
async fn test_store_eviction_under_concurrency() -> Result<()> {
    init_test_environment();
    const WRITERS: usize = 4;
    const PER_WRITER: usize = 300;
    const CAP: usize = 250;

    let store = Arc::new(RollingStore::new(CAP, 100));

    let handles: Vec<_> = (0..WRITERS)
        .map(|w| {
            let store = store.clone();
            tokio::spawn(async move {
                let source = format!("s{}", w);
                for seq in 0..PER_WRITER {
                    store
                        .append_reading(sequenced_reading("p1", &source, seq))
                        .await;
                }
            })
        })
        .collect();

    for joined in futures::future::join_all(handles).await {
        joined?;
    }

    // more writes than capacity: exactly the cap is retained
    assert_eq!(store.history_len("p1").await, CAP);

    // survivors still carry gapless per-source suffixes: for each source
    // the retained seqs are consecutive and end at PER_WRITER - 1
    let retained = store.recent_readings("p1", CAP).await;
    assert_gapless_per_source(&retained);
    Ok(())
}

#[tokio::test]
async fn test_engine_concurrent_sources_one_subject() -> Result<()> {
    init_test_environment();
    const SOURCES: usize = 3;
    const PER_SOURCE: usize = 30;

    let mut config = fast_config();
    config.sampling.cadence.pulse_oximeter_ms = 1;
    config.history.trend_window = SOURCES * PER_SOURCE;

    let drivers = DriverRegistry::simulated().with_factory(
        SourceClass::PulseOximeter,
        Arc::new(|descriptor| {
            Box::new(ScriptedDriver::sequence(
                &descriptor.subject_id,
                &descriptor.source_id,
                PER_SOURCE,
            ))
        }),
    );

    let engine = MonitoringEngine::builder(config).drivers(drivers).build()?;
    for n in 0..SOURCES {
        engine
            .register_source(&format!("s{}", n), "pulse_oximeter", "p1")
            .await?;
    }
    assert_eq!(engine.start("p1").await?, SOURCES);

    // wait until every script has drained
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let ingested = engine.statistics().await.total_readings;
        if ingested as usize >= SOURCES * PER_SOURCE {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "only {} of {} readings ingested",
            ingested,
            SOURCES * PER_SOURCE
        );
        sleep(Duration::from_millis(10)).await;
    }
    engine.stop("p1").await;

    let status = engine.status("p1").await?;
    assert_eq!(status.trend.len(), SOURCES * PER_SOURCE);
    assert_gapless_per_source(&status.trend);

    let stats = engine.statistics().await;
    assert_eq!(stats.total_readings as usize, SOURCES * PER_SOURCE);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_subjects_are_isolated() -> Result<()> {
    init_test_environment();
    let mut config = fast_config();
    config.sampling.cadence.pulse_oximeter_ms = 1;

    let drivers = DriverRegistry::simulated().with_factory(
        SourceClass::PulseOximeter,
        Arc::new(|descriptor| {
            Box::new(ScriptedDriver::sequence(
                &descriptor.subject_id,
                &descriptor.source_id,
                10,
            ))
        }),
    );

    let engine = MonitoringEngine::builder(config).drivers(drivers).build()?;
    engine.register_source("a1", "pulse_oximeter", "pa").await?;
    engine.register_source("b1", "pulse_oximeter", "pb").await?;
    engine.start("pa").await?;
    engine.start("pb").await?;

    sleep(Duration::from_millis(150)).await;

    // stopping one subject leaves the other's task running
    engine.stop("pa").await;
    let stats = engine.statistics().await;
    assert_eq!(stats.active_sources, 1);

    let status_a = engine.status("pa").await?;
    let status_b = engine.status("pb").await?;
    for reading in &status_a.trend {
        assert_eq!(reading.subject_id, "pa");
    }
    for reading in &status_b.trend {
        assert_eq!(reading.subject_id, "pb");
    }

    engine.stop("pb").await;
    Ok(())
}
