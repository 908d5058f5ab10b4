//! Fleet broadcaster: fan one envelope out to every target.
//!
//! Each target gets its own task and exactly one [`Transport::deliver`]
//! call. Tasks share only the immutable envelope and the transport handle;
//! results flow back through the `JoinSet` to a single collector that owns
//! one slot per target, so no lock is ever held across a transport call.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use keyprop_events::DeliveryEnvelope;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::audit::{AttemptRecord, AuditRecord, AuditSink};
use crate::error::BroadcastError;
use crate::outcome::{DeliveryOutcome, DeliveryState};
use crate::result::BroadcastResult;
use crate::target::{DeploymentTarget, TargetSet};
use crate::transport::{DeliveryError, Transport};
use crate::{DEFAULT_BROADCAST_DEADLINE, DEFAULT_DELIVERY_TIMEOUT};

/// Time bounds applied by the broadcaster.
#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    /// Upper bound on a single transport call (including its own retries).
    /// Expiry fails that target with [`DeliveryError::Timeout`].
    pub delivery_timeout: Option<Duration>,

    /// Upper bound on the whole broadcast. Expiry behaves like cancellation.
    pub deadline: Option<Duration>,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            delivery_timeout: Some(DEFAULT_DELIVERY_TIMEOUT),
            deadline: Some(DEFAULT_BROADCAST_DEADLINE),
        }
    }
}

/// Why collection stopped before every delivery finished.
#[derive(Debug, Clone, Copy)]
enum Interrupt {
    Cancelled,
    DeadlineExceeded,
}

/// What a delivery task hands back to the collector.
type TaskOutput = (usize, DeliveryState, Duration);

/// Slot contents: terminal state plus transport time when known.
type Settled = (DeliveryState, Option<Duration>);

/// Fans change events out to a fleet of gateways.
pub struct Broadcaster {
    transport: Arc<dyn Transport>,
    audit: Arc<dyn AuditSink>,
    config: BroadcastConfig,
}

impl Broadcaster {
    pub fn new(
        transport: Arc<dyn Transport>,
        audit: Arc<dyn AuditSink>,
        config: BroadcastConfig,
    ) -> Self {
        Self {
            transport,
            audit,
            config,
        }
    }

    pub fn config(&self) -> &BroadcastConfig {
        &self.config
    }

    /// Deliver `envelope` to every target and aggregate the outcomes.
    ///
    /// Never fails because of a delivery: per-target errors are folded into
    /// the outcome list. When `cancel` fires (or the configured deadline
    /// passes), outstanding deliveries are abandoned and marked cancelled;
    /// deliveries that had already finished keep their result.
    #[instrument(
        skip_all,
        fields(
            broadcast_id = %envelope.broadcast_id,
            event_type = envelope.event.event_type(),
            transport = self.transport.kind(),
            targets = targets.len(),
        )
    )]
    pub async fn broadcast(
        &self,
        envelope: Arc<DeliveryEnvelope>,
        targets: &TargetSet,
        cancel: &CancellationToken,
    ) -> Result<BroadcastResult, BroadcastError> {
        let targets: Vec<&DeploymentTarget> = targets.iter().collect();
        let mut slots: Vec<Option<Settled>> = vec![None; targets.len()];
        let mut task_slots = HashMap::with_capacity(targets.len());
        let mut tasks: JoinSet<TaskOutput> = JoinSet::new();

        for (index, target) in targets.iter().enumerate() {
            let transport = Arc::clone(&self.transport);
            let envelope = Arc::clone(&envelope);
            let target = (*target).clone();
            let timeout = self.config.delivery_timeout;

            let handle = tasks.spawn(async move {
                let started = Instant::now();
                let state = deliver_once(transport.as_ref(), &target, &envelope, timeout).await;
                (index, state, started.elapsed())
            });
            task_slots.insert(handle.id(), index);
        }

        let deadline = self.config.deadline;
        let expiry = async move {
            match deadline {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(expiry);

        let mut interrupted = None;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    interrupted = Some(Interrupt::Cancelled);
                    break;
                }
                _ = &mut expiry => {
                    interrupted = Some(Interrupt::DeadlineExceeded);
                    break;
                }
                joined = tasks.join_next_with_id() => match joined {
                    Some(joined) => settle(joined, &task_slots, &mut slots),
                    None => break,
                },
            }
        }

        if let Some(reason) = interrupted {
            warn!(
                ?reason,
                outstanding = tasks.len(),
                "Broadcast interrupted, abandoning outstanding deliveries"
            );
            tasks.abort_all();
            // Drain: finished tasks keep their result, aborted ones settle as cancelled.
            while let Some(joined) = tasks.join_next_with_id().await {
                settle(joined, &task_slots, &mut slots);
            }
        }

        let outcomes: Vec<DeliveryOutcome> = targets
            .iter()
            .zip(slots)
            .map(|(target, slot)| {
                let (state, elapsed) = slot.unwrap_or((DeliveryState::Cancelled, None));
                self.audit.record(AuditRecord::Attempt(AttemptRecord {
                    broadcast_id: envelope.broadcast_id,
                    gateway_id: target.gateway_id.clone(),
                    event_type: envelope.event.event_type().to_string(),
                    key_name: envelope.event.key_name().clone(),
                    state: state.clone(),
                    elapsed_ms: elapsed.map(|d| d.as_millis() as u64),
                    recorded_at: Utc::now(),
                }));
                DeliveryOutcome {
                    gateway_id: target.gateway_id.clone(),
                    state,
                }
            })
            .collect();

        let result = BroadcastResult::from_outcomes(envelope, outcomes)?;
        let counts = result.counts();
        info!(
            succeeded = counts.succeeded,
            failed = counts.failed,
            cancelled = counts.cancelled,
            success = result.verdict.is_success(),
            partial_failure = result.verdict.warning().is_some(),
            "Broadcast complete"
        );

        self.audit.record(AuditRecord::Summary(result.summary()));
        Ok(result)
    }
}

/// Run one transport call, bounded by `timeout`, and classify the result.
async fn deliver_once(
    transport: &dyn Transport,
    target: &DeploymentTarget,
    envelope: &DeliveryEnvelope,
    timeout: Option<Duration>,
) -> DeliveryState {
    let attempt = transport.deliver(target, envelope);
    let result = match timeout {
        Some(limit) => tokio::time::timeout(limit, attempt)
            .await
            .unwrap_or_else(|_| {
                Err(DeliveryError::Timeout {
                    timeout_ms: limit.as_millis() as u64,
                })
            }),
        None => attempt.await,
    };

    match result {
        Ok(()) => {
            debug!(gateway_id = %target.gateway_id, "Delivery succeeded");
            DeliveryState::Succeeded
        }
        Err(error) => {
            debug!(gateway_id = %target.gateway_id, error = %error, "Delivery failed");
            DeliveryState::Failed { error }
        }
    }
}

/// Write a joined task's result into its slot. Each slot is written once.
fn settle(
    joined: Result<(tokio::task::Id, TaskOutput), JoinError>,
    task_slots: &HashMap<tokio::task::Id, usize>,
    slots: &mut [Option<Settled>],
) {
    let (index, settled) = match joined {
        Ok((_, (index, state, elapsed))) => (index, (state, Some(elapsed))),
        Err(err) => {
            let Some(&index) = task_slots.get(&err.id()) else {
                warn!(task_id = %err.id(), "Joined a delivery task with no slot");
                return;
            };
            let state = if err.is_panic() {
                let message = panic_message(err.into_panic());
                warn!(message = %message, "Delivery task panicked");
                DeliveryState::Failed {
                    error: DeliveryError::Panicked { message },
                }
            } else {
                DeliveryState::Cancelled
            };
            (index, (state, None))
        }
    };

    if let Some(slot) = slots.get_mut(index) {
        if slot.is_none() {
            *slot = Some(settled);
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
