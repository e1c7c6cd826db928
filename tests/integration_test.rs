use reagent_dispenser::types::{
    DispenseBatch, PlannedOperation, PlannedOperationStatus, Plate, Reagent, Well,
    DISPENSE_STATUS_TOPIC,
};
use reagent_dispenser::{
    orchestrator_config, AppConfig, ConfigLoader, Dispenser, DispenserError, ExecutionPhase,
    MockBackend, PushBus, SubmissionStrategy,
};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ═══════════════════════════════════════════════════════════════════════════
// FIXTURES
// ═══════════════════════════════════════════════════════════════════════════

const BUFFER: i64 = 500;
const DYE: i64 = 501;

fn lab() -> MockBackend {
    let wells = |base: i64| {
        vec![
            Well::new("A1", 200.0).with_id(base + 1),
            Well::new("A2", 200.0).with_id(base + 2),
            Well::new("B1", 200.0).with_id(base + 3).with_volume(150.0),
        ]
    };

    MockBackend::new()
        .with_plate(Plate::new("PLATE-001", 8, 12).with_id(1), wells(100))
        .with_plate(Plate::new("PLATE-002", 8, 12).with_id(2), wells(200))
        .with_reagent(Reagent::new("Buffer A", 1000.0).with_id(BUFFER))
        .with_reagent(Reagent::new("Dye", 50.0).with_id(DYE))
}

/// Plays the instrument: reports every operation of `batch` and then the batch itself
fn run_instrument(bus: &PushBus, batch: &DispenseBatch, fill: f64) {
    let plate_id = batch.plate_id.unwrap_or_default();
    for op in batch.operations.iter().flatten() {
        bus.publish(
            DISPENSE_STATUS_TOPIC,
            json!({
                "type": "OPERATION_STATUS_CHANGE",
                "payload": {
                    "id": op.id,
                    "plateId": plate_id,
                    "wellPosition": op.well_position,
                    "reagentId": op.reagent_id,
                    "wellVolume": fill,
                    "status": "COMPLETED",
                }
            })
            .to_string(),
        );
    }
    bus.publish(
        DISPENSE_STATUS_TOPIC,
        json!({
            "type": "BATCH_EXECUTION_COMPLETED",
            "payload": { "id": batch.id, "plateId": plate_id, "status": "COMPLETED" }
        })
        .to_string(),
    );
}

async fn wait_for(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

// ═══════════════════════════════════════════════════════════════════════════
// CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_config_selects_strategy() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("config/sequential.yaml");
    let config = ConfigLoader::from_file(&path).unwrap();

    let orchestrator = orchestrator_config(&config);
    assert_eq!(orchestrator.strategy, SubmissionStrategy::Sequential);
    assert_eq!(orchestrator.settle_delay, Duration::from_millis(500));

    let defaults = orchestrator_config(&AppConfig::default());
    assert_eq!(defaults.strategy, SubmissionStrategy::ServerBatch);
    assert_eq!(defaults.completion_timeout, Duration::from_secs(300));
    assert_eq!(defaults.status_topic, DISPENSE_STATUS_TOPIC);
}

#[test]
fn test_invalid_config_is_rejected() {
    let mut config = AppConfig::default();
    config.backend.base_url = "dispenser:8080".to_string();

    assert!(matches!(
        Dispenser::from_config(&config),
        Err(DispenserError::Config(_))
    ));
}

#[test]
fn test_valid_config_builds_dispenser() {
    let mut config = AppConfig::default();
    config.push.enabled = false;
    config.execution.min_volume = 1.0;

    let dispenser = Dispenser::from_config(&config).unwrap();
    assert_eq!(dispenser.config().min_volume, 1.0);
}

// ═══════════════════════════════════════════════════════════════════════════
// END TO END
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_server_batch_round_trip() -> anyhow::Result<()> {
    let backend = lab();
    let bus = PushBus::new();
    let dispenser = Dispenser::new(Arc::new(backend.clone()), orchestrator_config(&AppConfig::default()))
        .with_push(Arc::new(bus.clone()));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let session = dispenser
        .open_plate_with_observer(
            1,
            Arc::new(move |op: &PlannedOperation| sink.lock().unwrap().push(op.status)),
        )
        .await?;

    session.plan_operation("A1", Some(BUFFER), 40.0)?;
    session.plan_operation("A2", Some(DYE), 10.0)?;
    assert_eq!(session.plan().total_volume(), 50.0);
    assert_eq!(session.plan().unique_wells(), 2);

    let report = session.execute(&true).await?.expect("confirmed");
    let batch_id = report.batch_id.expect("batch created");
    assert!(report.awaiting_completion);

    let batch = backend.stored_batch(batch_id).expect("batch stored");
    assert_eq!(batch.operation_count, 2);
    run_instrument(&bus, &batch, 40.0);

    wait_for(|| backend.wells_requests() == 2).await;

    assert_eq!(session.phase(), ExecutionPhase::Idle);
    assert!(session
        .operations()
        .iter()
        .all(|op| op.status == PlannedOperationStatus::Completed));
    assert_eq!(session.status_message(), "All operations completed successfully!");
    assert_eq!(
        seen.lock().unwrap().as_slice(),
        [
            PlannedOperationStatus::Executing,
            PlannedOperationStatus::Executing,
            PlannedOperationStatus::Completed,
            PlannedOperationStatus::Completed,
        ]
    );

    let metrics = dispenser.metrics().export_metrics()?;
    assert!(metrics.contains("dispense_batches_started_total"));

    session.close();
    Ok(())
}

#[tokio::test]
async fn test_sessions_only_see_their_plate() -> anyhow::Result<()> {
    let backend = lab();
    let bus = PushBus::new();
    let dispenser = Dispenser::new(Arc::new(backend.clone()), orchestrator_config(&AppConfig::default()))
        .with_push(Arc::new(bus.clone()));

    let first = dispenser.open_plate(1).await?;
    let second = dispenser.open_plate(2).await?;
    assert_eq!(bus.subscriber_count(DISPENSE_STATUS_TOPIC), 2);

    first.plan_operation("A1", Some(BUFFER), 25.0)?;
    second.plan_operation("A1", Some(BUFFER), 25.0)?;
    let first_report = first.execute(&true).await?.expect("confirmed");
    second.execute(&true).await?;

    let batch = backend
        .stored_batch(first_report.batch_id.expect("batch created"))
        .expect("batch stored");
    run_instrument(&bus, &batch, 25.0);

    // Opening two sessions loaded wells twice; the completion adds one reload
    wait_for(|| backend.wells_requests() == 3).await;

    assert_eq!(first.phase(), ExecutionPhase::Idle);
    assert!(second.is_executing());
    assert_eq!(
        second.operations()[0].status,
        PlannedOperationStatus::Executing
    );
    assert_eq!(second.well("A1").and_then(|w| w.volume), None);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_sequential_strategy_waits_between_operations() -> anyhow::Result<()> {
    let backend = lab();
    let mut config = AppConfig::default();
    config.backend.server_batch = false;
    let dispenser = Dispenser::new(Arc::new(backend.clone()), orchestrator_config(&config));

    let session = dispenser.open_plate(1).await?;
    session.plan_operation("A1", Some(BUFFER), 10.0)?;
    session.plan_operation("A2", Some(BUFFER), 10.0)?;
    session.plan_operation("B1", Some(BUFFER), 10.0)?;

    let started = tokio::time::Instant::now();
    let report = session.execute(&true).await?.expect("confirmed");
    let elapsed = started.elapsed();

    assert_eq!(report.strategy, SubmissionStrategy::Sequential);
    assert_eq!(report.completed, 3);
    // Two settle delays: none after the last operation
    assert!(elapsed >= Duration::from_millis(1000));
    assert!(elapsed < Duration::from_millis(1500));
    assert_eq!(session.well("B1").and_then(|w| w.volume), Some(160.0));
    Ok(())
}
