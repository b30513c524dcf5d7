//! The audit trail service.
//!
//! [`AuditLog`] is the single write path for audit events. Callers never see
//! audit-write failures: the outcome of the audited operation is already
//! decided when the event is recorded. A failed write is escalated to the
//! configured [`AlertSink`] exactly once and is not retried.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::actor::TenantId;
use crate::audit::event::{AuditAction, AuditEvent, AuditEventBuilder};
use crate::audit::store::{AuditError, AuditRange, AuditStore};
use crate::time::DynClock;

/// Default capacity of the background audit queue.
pub const DEFAULT_AUDIT_QUEUE: usize = 1024;

/// Operational alerting hook for audit writes that could not be persisted.
pub trait AlertSink: Send + Sync {
    fn escalate(&self, event: &AuditEvent, error: &AuditError);
}

/// Alert sink that reports through `tracing` on the `carevault::alert` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn escalate(&self, event: &AuditEvent, error: &AuditError) {
        tracing::error!(
            target: "carevault::alert",
            audit_id = %event.id,
            tenant = %event.tenant_id,
            action = event.action.to_subtype_code(),
            actor = %event.actor_id,
            error = %error,
            "Audit event could not be persisted"
        );
    }
}

#[derive(Clone)]
enum Delivery {
    Inline,
    Background(mpsc::Sender<AuditEvent>),
}

/// Shared state between the log handle and its background writer.
struct Sink {
    store: Arc<dyn AuditStore>,
    alert: Arc<dyn AlertSink>,
    escalations: AtomicU64,
}

impl Sink {
    async fn write(&self, event: AuditEvent) {
        match self.store.append(&event).await {
            Ok(()) => {
                tracing::trace!(
                    audit_id = %event.id,
                    action = event.action.to_subtype_code(),
                    "Audit event stored"
                );
            }
            Err(e) => {
                self.escalations.fetch_add(1, Ordering::Relaxed);
                self.alert.escalate(&event, &e);
            }
        }
    }
}

/// Append-only audit trail.
#[derive(Clone)]
pub struct AuditLog {
    sink: Arc<Sink>,
    delivery: Delivery,
    clock: DynClock,
}

/// Drains the background queue into the audit store.
pub struct AuditWriter {
    sink: Arc<Sink>,
    receiver: mpsc::Receiver<AuditEvent>,
}

impl AuditWriter {
    /// Run until every [`AuditLog`] handle is dropped and the queue is empty.
    pub async fn run(mut self) {
        while let Some(event) = self.receiver.recv().await {
            self.sink.write(event).await;
        }
        tracing::debug!("Audit writer drained and stopped");
    }
}

impl AuditLog {
    /// Audit log that awaits every durable append before returning.
    pub fn inline(store: Arc<dyn AuditStore>, clock: DynClock) -> Self {
        Self::with_alert_sink(store, clock, Arc::new(TracingAlertSink))
    }

    /// Inline audit log with a custom alert sink.
    pub fn with_alert_sink(
        store: Arc<dyn AuditStore>,
        clock: DynClock,
        alert: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            sink: Arc::new(Sink {
                store,
                alert,
                escalations: AtomicU64::new(0),
            }),
            delivery: Delivery::Inline,
            clock,
        }
    }

    /// Audit log that enqueues events for a background writer.
    ///
    /// The returned [`AuditWriter`] must be spawned (`tokio::spawn(writer.run())`).
    /// When the queue is full the event is written inline instead, so an
    /// event is never dropped for lack of queue space.
    pub fn background(
        store: Arc<dyn AuditStore>,
        clock: DynClock,
        alert: Arc<dyn AlertSink>,
        capacity: usize,
    ) -> (Self, AuditWriter) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let log = Self {
            delivery: Delivery::Background(sender),
            ..Self::with_alert_sink(store, clock, alert)
        };
        let writer = AuditWriter {
            sink: log.sink.clone(),
            receiver,
        };
        (log, writer)
    }

    /// Start an event performed by nobody in particular in `tenant`.
    pub fn event(&self, tenant: TenantId, action: AuditAction) -> AuditEventBuilder {
        AuditEventBuilder::new(tenant, action)
    }

    /// Stamp and record an event. Never fails from the caller's perspective.
    pub async fn record(&self, builder: AuditEventBuilder) -> String {
        let event = builder.build(self.clock.now());
        let id = event.id.clone();
        match &self.delivery {
            Delivery::Inline => self.sink.write(event).await,
            Delivery::Background(sender) => match sender.try_send(event) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(event))
                | Err(mpsc::error::TrySendError::Closed(event)) => {
                    tracing::debug!(audit_id = %id, "Audit queue unavailable, writing inline");
                    self.sink.write(event).await;
                }
            },
        }
        id
    }

    /// Chronological audit retrieval for one tenant.
    pub async fn query(
        &self,
        tenant: &TenantId,
        range: AuditRange,
        cancel: &CancellationToken,
    ) -> Result<Vec<AuditEvent>, AuditError> {
        self.sink.store.list_by_tenant(tenant, range, cancel).await
    }

    /// Number of audit writes escalated to alerting since start-up.
    pub fn escalations(&self) -> u64 {
        self.sink.escalations.load(Ordering::Relaxed)
    }

    pub fn clock(&self) -> &DynClock {
        &self.clock
    }

    pub fn is_background(&self) -> bool {
        matches!(self.delivery, Delivery::Background(_))
    }
}
