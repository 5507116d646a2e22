mod common;

use std::sync::Arc;
use std::time::Duration;

use bolt_downlinks::delivery::{
    BackupSink, Cancellation, DeliverySettings, DeliveryState, FlushFailurePolicy, Outcome,
    RunContext, RunReport, Stage, deliver,
};
use bolt_downlinks::error::GatewayError;
use bolt_downlinks::gateway::Gateway as _;
use bolt_downlinks::store::DownlinkStore;
use common::*;
use tokio::time::Instant;

async fn run(
    gateway: &Arc<ScriptedGateway>,
    store: &Arc<DownlinkStore>,
    settings: DeliverySettings,
) -> RunReport {
    let ctx = Arc::new(RunContext::new("gw.plant.local_8080", settings));
    deliver(Arc::clone(gateway), Arc::clone(store), ctx).await
}

#[tokio::test(start_paused = true)]
async fn confirmed_downlink_is_acknowledged() {
    let gateway = ScriptedGateway::new();
    let store = store(&[BK_DEVICE], true);

    let report = run(&gateway, &store, settings()).await;

    let outcome = report.get(BK_DEVICE).unwrap();
    assert_eq!(outcome.outcome, Outcome::Confirmed);
    assert_eq!(outcome.stage, Stage::Done);
    assert_eq!(outcome.attempts, 3);
    assert!(report.is_success());

    let downlink = store.get(&id(BK_DEVICE)).unwrap();
    assert_eq!(downlink.state(), DeliveryState::Confirmed);
    assert_eq!(downlink.references().len(), 2);
    let states: Vec<_> = downlink.history().iter().map(|t| t.to).collect();
    assert_eq!(
        states,
        [
            DeliveryState::Enqueued,
            DeliveryState::AwaitingConfirmation,
            DeliveryState::Confirmed
        ]
    );

    let sent = gateway.enqueued_for(BK_DEVICE);
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].bytes().unwrap(), [0x01, 0x00, 0x00, 0x95]);
    assert_eq!(sent[1].bytes().unwrap(), [0x0a, 0x50]);
    assert!(sent.iter().all(|r| r.fport == 10 && r.confirmed));
}

#[tokio::test(start_paused = true)]
async fn failed_device_does_not_stop_the_others() {
    let gateway = ScriptedGateway::new();
    gateway.fail_enqueue(
        MK_DEVICE,
        [GatewayError::Protocol {
            status: 400,
            body: "bad payload".into(),
        }],
    );
    let store = store(&[BK_DEVICE, MK_DEVICE, UNA_DEVICE], true);

    let report = run(&gateway, &store, settings()).await;

    assert_eq!(report.get(BK_DEVICE).unwrap().outcome, Outcome::Confirmed);
    assert_eq!(report.get(UNA_DEVICE).unwrap().outcome, Outcome::Confirmed);

    let failed = report.get(MK_DEVICE).unwrap();
    assert_eq!(failed.outcome, Outcome::Failed);
    assert_eq!(failed.stage, Stage::Enqueue);
    assert_eq!(failed.attempts, 1);
    assert!(failed.reason.as_deref().unwrap().contains("400"));

    assert_eq!(report.aborted, None);
    assert!(!report.is_success());
    assert_eq!(report.summary(), "2 confirmed, 1 failed");

    let downlink = store.get(&id(MK_DEVICE)).unwrap();
    assert_eq!(downlink.state(), DeliveryState::Failed);
    assert!(downlink.last_error().unwrap().contains("bad payload"));
}

#[tokio::test(start_paused = true)]
async fn rejected_session_mid_run_aborts_with_partial_report() {
    let gateway = ScriptedGateway::new();
    gateway.fail_enqueue(
        BK_DEVICE,
        [GatewayError::Authentication("session revoked".into())],
    );
    let store = store(&[BK_DEVICE, MK_DEVICE, UNA_DEVICE], true);
    let settings = DeliverySettings {
        workers: 1,
        ..settings()
    };

    let report = run(&gateway, &store, settings).await;

    let failed = report.get(BK_DEVICE).unwrap();
    assert_eq!(failed.outcome, Outcome::Failed);
    assert_eq!(failed.stage, Stage::Enqueue);

    for device in [MK_DEVICE, UNA_DEVICE] {
        let outcome = report.get(device).unwrap();
        assert_eq!(outcome.outcome, Outcome::NotAttempted);
        assert!(outcome.reason.as_deref().unwrap().contains("authentication failed"));
        assert_eq!(store.get(&id(device)).unwrap().state(), DeliveryState::Generated);
    }

    assert!(report.aborted.as_deref().unwrap().contains("session revoked"));
    assert_eq!(gateway.calls().enqueue, 1);
}

#[tokio::test(start_paused = true)]
async fn partial_report_keeps_devices_finished_before_the_abort() {
    let gateway = ScriptedGateway::new();
    gateway.fail_enqueue(
        MK_DEVICE,
        [GatewayError::Authentication("session revoked".into())],
    );
    let store = store(&[BK_DEVICE, MK_DEVICE, UNA_DEVICE], true);
    let settings = DeliverySettings {
        workers: 1,
        ..settings()
    };

    let report = run(&gateway, &store, settings).await;

    let done = report.get(BK_DEVICE).unwrap();
    assert_eq!(done.outcome, Outcome::Confirmed);
    assert_eq!(done.stage, Stage::Done);
    assert_eq!(store.get(&id(BK_DEVICE)).unwrap().state(), DeliveryState::Confirmed);

    let failed = report.get(MK_DEVICE).unwrap();
    assert_eq!(failed.outcome, Outcome::Failed);
    assert_eq!(failed.stage, Stage::Enqueue);

    let pending = report.get(UNA_DEVICE).unwrap();
    assert_eq!(pending.outcome, Outcome::NotAttempted);
    assert_eq!(store.get(&id(UNA_DEVICE)).unwrap().state(), DeliveryState::Generated);

    assert_eq!(report.count(Outcome::Confirmed), 1);
    assert!(report.aborted.as_deref().unwrap().contains("session revoked"));
    assert!(!report.is_success());
}

#[tokio::test(start_paused = true)]
async fn login_failure_attempts_nothing() {
    let gateway = ScriptedGateway::new();
    gateway.fail_login(GatewayError::Authentication("bad password".into()));
    let store = store(&[BK_DEVICE, MK_DEVICE], true);

    let report = run(&gateway, &store, settings()).await;

    assert_eq!(report.count(Outcome::NotAttempted), 2);
    assert!(report.aborted.as_deref().unwrap().contains("bad password"));
    assert_eq!(gateway.calls().authenticate, 1);
    assert_eq!(gateway.calls().enqueue, 0);
}

#[tokio::test(start_paused = true)]
async fn transient_login_failure_is_retried() {
    let gateway = ScriptedGateway::new();
    gateway.fail_login(unavailable());
    let store = store(&[BK_DEVICE], true);

    let report = run(&gateway, &store, settings()).await;

    assert!(report.is_success());
    assert_eq!(gateway.calls().authenticate, 2);
}

#[tokio::test(start_paused = true)]
async fn worker_count_does_not_change_outcomes() {
    let devices = [BK_DEVICE, MK_DEVICE, UNA_DEVICE, "A0B1C2D3E4F50101", "A0B1C2D3E4F50102"];

    let mut reports = Vec::new();
    for workers in [1, 4] {
        let gateway = ScriptedGateway::new();
        gateway.fail_enqueue(MK_DEVICE, [unavailable(), unavailable(), unavailable(), unavailable()]);
        gateway.ack_after(UNA_DEVICE, Some(2));
        let store = store(&devices, true);

        let settings = DeliverySettings {
            workers,
            ..settings()
        };
        reports.push(run(&gateway, &store, settings).await);
    }

    assert_eq!(reports[0], reports[1]);
    assert_eq!(reports[0].summary(), "4 confirmed, 1 failed");
    assert_eq!(reports[0].get(UNA_DEVICE).unwrap().attempts, 4);
}

#[tokio::test(start_paused = true)]
async fn transient_enqueue_failures_are_retried() {
    let gateway = ScriptedGateway::new();
    gateway.fail_enqueue(BK_DEVICE, [unavailable(), unavailable()]);
    let store = store(&[BK_DEVICE], true);

    let started = Instant::now();
    let report = run(&gateway, &store, settings()).await;

    let outcome = report.get(BK_DEVICE).unwrap();
    assert_eq!(outcome.outcome, Outcome::Confirmed);
    assert_eq!(outcome.attempts, 5);
    assert_eq!(store.get(&id(BK_DEVICE)).unwrap().attempt_count(), 5);
    assert_eq!(gateway.enqueued_for(BK_DEVICE).len(), 2);
    // 1s + 2s of backoff, then one poll interval
    assert!(started.elapsed() >= Duration::from_secs(152));
}

#[tokio::test(start_paused = true)]
async fn retry_budget_is_bounded() {
    let gateway = ScriptedGateway::new();
    gateway.fail_enqueue(BK_DEVICE, std::iter::repeat_with(unavailable).take(10));
    let store = store(&[BK_DEVICE], true);

    let report = run(&gateway, &store, settings()).await;

    let outcome = report.get(BK_DEVICE).unwrap();
    assert_eq!(outcome.outcome, Outcome::Failed);
    assert_eq!(outcome.stage, Stage::Enqueue);
    assert_eq!(outcome.attempts, 4);
    assert!(outcome.reason.as_deref().unwrap().contains("503"));
}

#[tokio::test(start_paused = true)]
async fn unacknowledged_downlink_times_out() {
    let gateway = ScriptedGateway::new();
    gateway.ack_after(BK_DEVICE, None);
    let store = store(&[BK_DEVICE], true);

    let started = Instant::now();
    let report = run(&gateway, &store, settings()).await;

    let outcome = report.get(BK_DEVICE).unwrap();
    assert_eq!(outcome.outcome, Outcome::Failed);
    assert_eq!(outcome.stage, Stage::Confirmation);
    assert_eq!(
        outcome.reason.as_deref(),
        Some("device did not acknowledge within 3 poll(s)")
    );
    assert_eq!(gateway.calls().status, 3);
    assert!(started.elapsed() >= Duration::from_secs(3 * 149));
}

#[tokio::test(start_paused = true)]
async fn late_acknowledgement_is_still_confirmed() {
    let gateway = ScriptedGateway::new();
    gateway.ack_after(BK_DEVICE, Some(3));
    let store = store(&[BK_DEVICE], true);

    let report = run(&gateway, &store, settings()).await;

    assert_eq!(report.get(BK_DEVICE).unwrap().outcome, Outcome::Confirmed);
    assert_eq!(gateway.calls().status, 3);
}

#[tokio::test(start_paused = true)]
async fn unconfirmed_downlink_is_delivered_without_polling() {
    let gateway = ScriptedGateway::new();
    let store = store(&[BK_DEVICE], false);

    let report = run(&gateway, &store, settings()).await;

    let outcome = report.get(BK_DEVICE).unwrap();
    assert_eq!(outcome.outcome, Outcome::Delivered);
    assert_eq!(gateway.calls().status, 0);
    assert!(gateway.enqueued_for(BK_DEVICE).iter().all(|r| !r.confirmed));
    assert_eq!(store.get(&id(BK_DEVICE)).unwrap().state(), DeliveryState::Delivered);
}

#[tokio::test(start_paused = true)]
async fn flush_is_idempotent() {
    let gateway = ScriptedGateway::new();
    let store = store(&[BK_DEVICE], false);
    run(&gateway, &store, settings()).await;
    assert_eq!(gateway.queue_len(BK_DEVICE), 2);

    let deveui = id(BK_DEVICE);
    for _ in 0..2 {
        gateway.flush_queue(&deveui).await.unwrap();
        assert!(gateway.get_queue(&deveui).await.unwrap().is_empty());
    }
}

#[tokio::test(start_paused = true)]
async fn pre_process_flush_empties_the_queue_first() {
    let gateway = ScriptedGateway::new();
    let first = store(&[BK_DEVICE], false);
    run(&gateway, &first, settings()).await;

    let mut settings = settings();
    settings.flush.pre_process = true;
    let second = store(&[BK_DEVICE], false);
    let report = run(&gateway, &second, settings).await;

    assert!(report.is_success());
    assert_eq!(gateway.queue_len(BK_DEVICE), 2);
    let states: Vec<_> = second
        .get(&id(BK_DEVICE))
        .unwrap()
        .history()
        .iter()
        .map(|t| t.to)
        .collect();
    assert_eq!(
        states,
        [
            DeliveryState::QueuedForFlush,
            DeliveryState::Flushed,
            DeliveryState::Enqueued,
            DeliveryState::Delivered
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn stubborn_queue_blocks_by_default() {
    let gateway = ScriptedGateway::new();
    gateway.stale_queue(BK_DEVICE, 2);
    let store = store(&[BK_DEVICE], true);
    let mut settings = settings();
    settings.flush.pre_process = true;

    let report = run(&gateway, &store, settings).await;

    let outcome = report.get(BK_DEVICE).unwrap();
    assert_eq!(outcome.outcome, Outcome::Failed);
    assert_eq!(outcome.stage, Stage::Flush);
    assert_eq!(
        outcome.reason.as_deref(),
        Some("queue still holds 2 item(s) after flush")
    );
    assert_eq!(gateway.calls().enqueue, 0);
    assert_eq!(gateway.calls().flush_queue, 4);
}

#[tokio::test(start_paused = true)]
async fn stubborn_queue_only_warns_when_configured() {
    let gateway = ScriptedGateway::new();
    gateway.stale_queue(BK_DEVICE, 2);
    let store = store(&[BK_DEVICE], true);
    let mut settings = settings();
    settings.flush.pre_process = true;
    settings.flush_failure_policy = FlushFailurePolicy::Warn;

    let report = run(&gateway, &store, settings).await;

    assert_eq!(report.get(BK_DEVICE).unwrap().outcome, Outcome::Confirmed);
    assert_eq!(gateway.enqueued_for(BK_DEVICE).len(), 2);
    assert_eq!(gateway.queue_len(BK_DEVICE), 4);
}

fn missing_queue_endpoint() -> GatewayError {
    GatewayError::Protocol {
        status: 404,
        body: "no queue endpoint".into(),
    }
}

#[tokio::test(start_paused = true)]
async fn failed_flush_only_warns_when_configured() {
    let gateway = ScriptedGateway::new();
    gateway.fail_flush(BK_DEVICE, [missing_queue_endpoint()]);
    let store = store(&[BK_DEVICE], true);
    let mut settings = settings();
    settings.flush.pre_process = true;
    settings.flush_failure_policy = FlushFailurePolicy::Warn;

    let report = run(&gateway, &store, settings).await;

    let outcome = report.get(BK_DEVICE).unwrap();
    assert_eq!(outcome.outcome, Outcome::Confirmed);
    assert_eq!(outcome.stage, Stage::Done);
    assert_eq!(gateway.enqueued_for(BK_DEVICE).len(), 2);
}

#[tokio::test(start_paused = true)]
async fn failed_flush_blocks_by_default() {
    let gateway = ScriptedGateway::new();
    gateway.fail_flush(BK_DEVICE, [missing_queue_endpoint()]);
    let store = store(&[BK_DEVICE], true);
    let mut settings = settings();
    settings.flush.pre_process = true;

    let report = run(&gateway, &store, settings).await;

    let outcome = report.get(BK_DEVICE).unwrap();
    assert_eq!(outcome.outcome, Outcome::Failed);
    assert_eq!(outcome.stage, Stage::Flush);
    assert_eq!(gateway.calls().enqueue, 0);
}

#[tokio::test(start_paused = true)]
async fn rejected_session_during_flush_fails_even_when_warning() {
    let gateway = ScriptedGateway::new();
    gateway.fail_flush(
        BK_DEVICE,
        [GatewayError::Authentication("session revoked".into())],
    );
    let store = store(&[BK_DEVICE], true);
    let mut settings = settings();
    settings.flush.pre_process = true;
    settings.flush_failure_policy = FlushFailurePolicy::Warn;

    let report = run(&gateway, &store, settings).await;

    let outcome = report.get(BK_DEVICE).unwrap();
    assert_eq!(outcome.outcome, Outcome::Failed);
    assert_eq!(outcome.stage, Stage::Flush);
    assert_eq!(gateway.calls().enqueue, 0);
    assert!(report.aborted.as_deref().unwrap().contains("session revoked"));
}

#[tokio::test(start_paused = true)]
async fn post_process_flush_cleans_up_after_failure() {
    let gateway = ScriptedGateway::new();
    gateway.ack_after(BK_DEVICE, None);
    let store = store(&[BK_DEVICE], true);
    let mut settings = settings();
    settings.flush.post_process = true;

    let report = run(&gateway, &store, settings).await;

    assert_eq!(report.get(BK_DEVICE).unwrap().outcome, Outcome::Failed);
    assert_eq!(gateway.calls().flush_queue, 1);
    assert_eq!(gateway.queue_len(BK_DEVICE), 0);
}

#[tokio::test(start_paused = true)]
async fn backups_are_written_per_gateway() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = ScriptedGateway::new();
    let store = store(&[BK_DEVICE], false);
    let mut settings = settings();
    settings.backup.device_properties = true;
    settings.backup.applications = true;
    settings.backup.queue_pre_process = true;
    settings.backup.queue_post_process = true;

    let sink = BackupSink::new(dir.path(), "10.0.0.5:8080");
    let backup_dir = sink.dir().to_path_buf();
    let ctx = Arc::new(RunContext::new("10.0.0.5:8080", settings).with_backup(sink));
    let report = deliver(Arc::clone(&gateway), Arc::clone(&store), ctx).await;
    assert!(report.is_success());

    let mut names: Vec<String> = std::fs::read_dir(&backup_dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names.len(), 4);
    for suffix in [
        "-device-properties.json".to_owned(),
        "-applications.json".to_owned(),
        format!("-queue-pre-{BK_DEVICE}.json"),
        format!("-queue-post-{BK_DEVICE}.json"),
    ] {
        assert!(names.iter().any(|n| n.ends_with(&suffix)), "{suffix} missing in {names:?}");
    }

    let states: Vec<_> = store
        .get(&id(BK_DEVICE))
        .unwrap()
        .history()
        .iter()
        .map(|t| t.to)
        .collect();
    assert_eq!(states.len(), 4);
    assert_eq!(states[3], DeliveryState::Delivered);
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_in_flight_and_pending_devices() {
    let gateway = ScriptedGateway::new();
    gateway.ack_after(BK_DEVICE, None);
    let store = store(&[BK_DEVICE, MK_DEVICE], true);
    let cancel = Cancellation::new();
    let settings = DeliverySettings {
        workers: 1,
        ..settings()
    };
    let ctx = Arc::new(RunContext::new("gw", settings).with_cancellation(cancel.clone()));

    let run = tokio::spawn(deliver(Arc::clone(&gateway), Arc::clone(&store), ctx));
    tokio::time::sleep(Duration::from_secs(200)).await;
    cancel.cancel("operator abort");
    let report = run.await.unwrap();

    let in_flight = report.get(BK_DEVICE).unwrap();
    assert_eq!(in_flight.outcome, Outcome::Failed);
    assert_eq!(in_flight.stage, Stage::Confirmation);
    assert_eq!(in_flight.reason.as_deref(), Some("cancelled: operator abort"));

    let pending = report.get(MK_DEVICE).unwrap();
    assert_eq!(pending.outcome, Outcome::NotAttempted);
    assert_eq!(report.aborted.as_deref(), Some("operator abort"));
    assert_eq!(gateway.enqueued_for(MK_DEVICE).len(), 0);
}
