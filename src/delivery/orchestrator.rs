use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::delivery::{
    BackupSink, BackupStage, Cancellation, DeliveryState, DeviceOutcome, Outcome, RetryPolicy,
    RunReport, Stage, with_retry,
};
use crate::device::DeviceIdentifier;
use crate::error::DeliveryError;
use crate::gateway::{EnqueueRequest, Gateway};
use crate::store::{DownlinkStore, InFlightGuard};

/// What happens when the pre-delivery flush fails or leaves items in the queue.
///
/// Authentication failures and cancellation stop the device under either policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FlushFailurePolicy {
    /// Fail the device.
    #[default]
    Block,
    /// Log and enqueue anyway.
    Warn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct FlushSettings {
    pub pre_process: bool,

    pub post_process: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct BackupSettings {
    pub device_properties: bool,

    pub applications: bool,

    pub queue_pre_process: bool,

    pub queue_post_process: bool,
}

impl BackupSettings {
    pub fn any(&self) -> bool {
        self.device_properties || self.applications || self.queue_pre_process || self.queue_post_process
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeliverySettings {
    pub workers: usize,

    pub max_polls: u32,

    /// Expected device check-in period; one status poll per interval.
    pub poll_interval: Duration,

    pub retry: RetryPolicy,

    pub flush_failure_policy: FlushFailurePolicy,

    pub flush: FlushSettings,

    pub backup: BackupSettings,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            workers: 4,
            max_polls: 10,
            poll_interval: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            flush_failure_policy: FlushFailurePolicy::default(),
            flush: FlushSettings::default(),
            backup: BackupSettings::default(),
        }
    }
}

/// Everything one delivery run against one gateway needs.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub gateway: String,

    pub settings: DeliverySettings,

    pub cancel: Cancellation,

    pub backup: Option<BackupSink>,
}

impl RunContext {
    pub fn new(gateway: impl Into<String>, settings: DeliverySettings) -> Self {
        Self {
            gateway: gateway.into(),
            settings,
            cancel: Cancellation::new(),
            backup: None,
        }
    }

    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_backup(mut self, backup: BackupSink) -> Self {
        self.backup = Some(backup);
        self
    }
}

struct StageError {
    stage: Stage,

    error: DeliveryError,
}

trait AtStage<T> {
    fn at(self, stage: Stage) -> Result<T, StageError>;
}

impl<T, E: Into<DeliveryError>> AtStage<T> for Result<T, E> {
    fn at(self, stage: Stage) -> Result<T, StageError> {
        self.map_err(|e| StageError {
            stage,
            error: e.into(),
        })
    }
}

/// Delivers every downlink in `store` through `gateway`.
///
/// Devices are independent: a failed device is recorded and the others keep
/// going. Authentication failures cancel the run.
pub async fn deliver<G>(gateway: Arc<G>, store: Arc<DownlinkStore>, ctx: Arc<RunContext>) -> RunReport
where
    G: Gateway + 'static,
{
    let devices = store.device_ids();
    let mut report = RunReport::default();
    for deveui in &devices {
        report.record(deveui.to_string(), DeviceOutcome::not_attempted(None));
    }

    let mut attempts = 0;
    let login = with_retry(&ctx.settings.retry, &ctx.cancel, &mut attempts, || {
        gateway.authenticate()
    })
    .await;
    if let Err(err) = login {
        error!(gateway = %ctx.gateway, %err, "gateway run aborted before delivery");
        if !err.is_cancelled() {
            ctx.cancel.cancel(format!("authentication failed: {err}"));
        }
        return abort(report, &ctx);
    }
    info!(gateway = %ctx.gateway, devices = devices.len(), "delivering downlinks");

    backup_gateway(gateway.as_ref(), &ctx).await;

    let permits = Arc::new(Semaphore::new(ctx.settings.workers.max(1)));
    let mut tasks = JoinSet::new();
    for deveui in devices {
        let gateway = Arc::clone(&gateway);
        let store = Arc::clone(&store);
        let ctx = Arc::clone(&ctx);
        let permits = Arc::clone(&permits);
        let span = info_span!("device", %deveui);

        tasks.spawn(
            async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return (deveui, DeviceOutcome::not_attempted(ctx.cancel.reason()));
                };
                if let Some(reason) = ctx.cancel.reason() {
                    return (deveui, DeviceOutcome::not_attempted(Some(reason)));
                }

                let outcome = match store.claim(deveui) {
                    Ok(guard) => deliver_device(gateway.as_ref(), &guard, &ctx).await,
                    Err(err) => DeviceOutcome::failed(Stage::Enqueue, 0, err),
                };
                (deveui, outcome)
            }
            .instrument(span),
        );
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((deveui, outcome)) => report.record(deveui.to_string(), outcome),
            Err(err) => error!(gateway = %ctx.gateway, %err, "delivery task panicked"),
        }
    }

    report.aborted = ctx.cancel.reason();
    info!(gateway = %ctx.gateway, summary = %report.summary(), "delivery finished");

    report
}

fn abort(mut report: RunReport, ctx: &RunContext) -> RunReport {
    let reason = ctx.cancel.reason();
    for outcome in report.devices.values_mut() {
        *outcome = DeviceOutcome::not_attempted(reason.clone());
    }
    report.aborted = reason;
    report
}

async fn backup_gateway<G: Gateway + ?Sized>(gateway: &G, ctx: &RunContext) {
    let Some(sink) = &ctx.backup else {
        return;
    };
    let backup = ctx.settings.backup;
    let mut attempts = 0;

    if backup.device_properties {
        let devices = with_retry(&ctx.settings.retry, &ctx.cancel, &mut attempts, || {
            gateway.list_devices()
        })
        .await;
        match devices {
            Ok(devices) => {
                if let Err(err) = sink.write("device-properties", &devices).await {
                    warn!(%err, "device property backup not written");
                }
            }
            Err(err) => warn!(%err, "cannot list devices for backup"),
        }
    }

    if backup.applications {
        let applications = with_retry(&ctx.settings.retry, &ctx.cancel, &mut attempts, || {
            gateway.list_applications()
        })
        .await;
        match applications {
            Ok(applications) => {
                if let Err(err) = sink.write("applications", &applications).await {
                    warn!(%err, "application backup not written");
                }
            }
            Err(err) => warn!(%err, "cannot list applications for backup"),
        }
    }
}

async fn deliver_device<G: Gateway + ?Sized>(
    gateway: &G,
    guard: &InFlightGuard,
    ctx: &RunContext,
) -> DeviceOutcome {
    let mut attempts = 0;
    let result = run_device(gateway, guard, ctx, &mut attempts).await;
    let _ = guard.update(|d| d.add_attempts(attempts));

    let StageError { stage, error } = match result {
        Ok(state) => {
            info!(%state, attempts, "downlink delivered");
            return DeviceOutcome {
                stage: Stage::Done,
                outcome: if state == DeliveryState::Confirmed {
                    Outcome::Confirmed
                } else {
                    Outcome::Delivered
                },
                attempts,
                reason: None,
            };
        }
        Err(err) => err,
    };

    let _ = guard.update(|d| d.fail(&error));
    if error.is_authentication() {
        ctx.cancel.cancel(format!("authentication failed: {error}"));
    }
    error!(?stage, %error, attempts, "delivery failed");

    if ctx.settings.flush.post_process && !ctx.cancel.is_cancelled() {
        let deveui = guard.deveui();
        let mut cleanup = 0;
        let flushed = with_retry(&ctx.settings.retry, &ctx.cancel, &mut cleanup, || {
            gateway.flush_queue(&deveui)
        })
        .await;
        if let Err(err) = flushed {
            warn!(%err, "post-process flush failed");
        }
    }

    DeviceOutcome::failed(stage, attempts, error)
}

fn advance(guard: &InFlightGuard, next: DeliveryState) -> Result<(), StageError> {
    let stage = match next {
        DeliveryState::BackupRequested(_) => Stage::Backup,
        DeliveryState::QueuedForFlush | DeliveryState::Flushed => Stage::Flush,
        DeliveryState::AwaitingConfirmation | DeliveryState::Confirmed => Stage::Confirmation,
        _ => Stage::Enqueue,
    };
    guard
        .update(|d| d.transition(next))
        .map_err(DeliveryError::from)
        .and_then(|r| r)
        .at(stage)?;
    debug!(state = %next, "advanced");
    Ok(())
}

async fn run_device<G: Gateway + ?Sized>(
    gateway: &G,
    guard: &InFlightGuard,
    ctx: &RunContext,
    attempts: &mut u32,
) -> Result<DeliveryState, StageError> {
    let settings = &ctx.settings;
    let deveui = guard.deveui();
    let downlink = guard.downlink().at(Stage::Enqueue)?;

    if settings.backup.queue_pre_process {
        advance(guard, DeliveryState::BackupRequested(BackupStage::Pre))?;
        backup_queue(gateway, ctx, deveui, BackupStage::Pre, attempts).await?;
    }

    if settings.flush.pre_process {
        advance(guard, DeliveryState::QueuedForFlush)?;
        match flush(gateway, ctx, deveui, attempts).await {
            Ok(()) => advance(guard, DeliveryState::Flushed)?,
            Err(err)
                if settings.flush_failure_policy == FlushFailurePolicy::Warn
                    && !err.is_authentication()
                    && !err.is_cancelled() =>
            {
                warn!(%err, "flush failed, enqueueing anyway");
            }
            Err(err) => return Err(err).at(Stage::Flush),
        }
    }

    for fragment in downlink.payload.fragments() {
        let reference = Uuid::new_v4().to_string();
        let request = EnqueueRequest::new(
            deveui,
            downlink.payload.fport(),
            downlink.confirmed,
            fragment.bytes(),
            reference.clone(),
        );
        with_retry(&settings.retry, &ctx.cancel, attempts, || {
            gateway.enqueue_downlink(&deveui, &request)
        })
        .await
        .at(Stage::Enqueue)?;
        guard.update(|d| d.push_reference(reference)).at(Stage::Enqueue)?;
        debug!(fragment = fragment.index(), "fragment enqueued");
    }
    advance(guard, DeliveryState::Enqueued)?;

    if settings.backup.queue_post_process {
        advance(guard, DeliveryState::BackupRequested(BackupStage::Post))?;
        backup_queue(gateway, ctx, deveui, BackupStage::Post, attempts).await?;
    }

    if !downlink.confirmed {
        advance(guard, DeliveryState::Delivered)?;
        return Ok(DeliveryState::Delivered);
    }

    advance(guard, DeliveryState::AwaitingConfirmation)?;
    let references = guard
        .downlink()
        .map(|d| d.references().to_vec())
        .at(Stage::Confirmation)?;

    for poll in 1..=settings.max_polls {
        ctx.cancel.sleep(settings.poll_interval).await.at(Stage::Confirmation)?;
        let status = with_retry(&settings.retry, &ctx.cancel, attempts, || {
            gateway.get_delivery_status(&deveui)
        })
        .await
        .at(Stage::Confirmation)?;

        if status.acknowledges_all(&references) {
            advance(guard, DeliveryState::Confirmed)?;
            return Ok(DeliveryState::Confirmed);
        }
        debug!(poll, max_polls = settings.max_polls, "not acknowledged yet");
    }

    Err(DeliveryError::ConfirmationTimeout {
        polls: settings.max_polls,
    })
    .at(Stage::Confirmation)
}

/// Empties the device queue, checking until it reports no items.
async fn flush<G: Gateway + ?Sized>(
    gateway: &G,
    ctx: &RunContext,
    deveui: DeviceIdentifier,
    attempts: &mut u32,
) -> Result<(), DeliveryError> {
    let policy = &ctx.settings.retry;
    let mut check = 0;
    loop {
        with_retry(policy, &ctx.cancel, attempts, || gateway.flush_queue(&deveui)).await?;
        let remaining = with_retry(policy, &ctx.cancel, attempts, || gateway.get_queue(&deveui))
            .await?
            .len();
        if remaining == 0 {
            return Ok(());
        }

        let Some(delay) = policy.delay_for_attempt(check) else {
            return Err(DeliveryError::FlushIncomplete { remaining });
        };
        check += 1;
        debug!(remaining, "queue not empty after flush");
        ctx.cancel.sleep(delay).await?;
    }
}

/// Snapshots the device queue; a failed snapshot is logged, not fatal.
async fn backup_queue<G: Gateway + ?Sized>(
    gateway: &G,
    ctx: &RunContext,
    deveui: DeviceIdentifier,
    stage: BackupStage,
    attempts: &mut u32,
) -> Result<(), StageError> {
    let Some(sink) = &ctx.backup else {
        return Ok(());
    };

    let queue = match with_retry(&ctx.settings.retry, &ctx.cancel, attempts, || {
        gateway.get_queue(&deveui)
    })
    .await
    {
        Ok(queue) => queue,
        Err(err) if err.is_authentication() || err.is_cancelled() => {
            return Err(err).at(Stage::Backup);
        }
        Err(err) => {
            warn!(%err, stage = stage.as_str(), "cannot read queue for backup");
            return Ok(());
        }
    };

    let name = format!("queue-{}-{deveui}", stage.as_str());
    if let Err(err) = sink.write(&name, &queue).await {
        warn!(%err, "queue backup not written");
    }

    Ok(())
}
