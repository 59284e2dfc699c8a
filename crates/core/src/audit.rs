use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::checkout::AttemptToken;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditCategory {
    Conversation,
    Cart,
    Checkout,
    Payment,
    Receipt,
    Persistence,
    System,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditOutcome {
    Success,
    Rejected,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    pub shopper_id: String,
    pub attempt: Option<AttemptToken>,
    pub correlation_id: String,
    pub actor: String,
}

impl AuditContext {
    pub fn new(
        shopper_id: impl Into<String>,
        attempt: Option<AttemptToken>,
        correlation_id: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            shopper_id: shopper_id.into(),
            attempt,
            correlation_id: correlation_id.into(),
            actor: actor.into(),
        }
    }

    pub fn with_attempt(&self, attempt: AttemptToken) -> Self {
        Self { attempt: Some(attempt), ..self.clone() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub shopper_id: String,
    pub attempt: Option<AttemptToken>,
    pub correlation_id: String,
    pub event_type: String,
    pub category: AuditCategory,
    pub actor: String,
    pub outcome: AuditOutcome,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn from_context(
        context: &AuditContext,
        event_type: impl Into<String>,
        category: AuditCategory,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            shopper_id: context.shopper_id.clone(),
            attempt: context.attempt,
            correlation_id: context.correlation_id.clone(),
            event_type: event_type.into(),
            category,
            actor: context.actor.clone(),
            outcome,
            metadata: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent);
}

#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn event_types(&self) -> Vec<String> {
        self.events().into_iter().map(|event| event.event_type).collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn emit(&self, event: AuditEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// Forwards audit events to the tracing subscriber.
#[derive(Clone, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let metadata = serde_json::to_string(&event.metadata).unwrap_or_default();
        let attempt = event.attempt.map(|token| token.0);
        match event.outcome {
            AuditOutcome::Success => tracing::info!(
                event_name = %event.event_type,
                shopper_id = %event.shopper_id,
                attempt = ?attempt,
                correlation_id = %event.correlation_id,
                actor = %event.actor,
                category = ?event.category,
                metadata = %metadata,
                "audit event"
            ),
            AuditOutcome::Rejected | AuditOutcome::Failed => tracing::warn!(
                event_name = %event.event_type,
                shopper_id = %event.shopper_id,
                attempt = ?attempt,
                correlation_id = %event.correlation_id,
                actor = %event.actor,
                category = ?event.category,
                outcome = ?event.outcome,
                metadata = %metadata,
                "audit event"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::audit::{
        AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink,
        TracingAuditSink,
    };
    use crate::checkout::AttemptToken;

    #[test]
    fn in_memory_sink_records_events_with_correlation_fields() {
        let sink = InMemoryAuditSink::default();
        let context = AuditContext::new("uid-42", Some(AttemptToken(1)), "req-123", "coordinator");
        sink.emit(
            AuditEvent::from_context(
                &context,
                "checkout.transition_applied",
                AuditCategory::Checkout,
                AuditOutcome::Success,
            )
            .with_metadata("from", "idle")
            .with_metadata("to", "initiated"),
        );

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].correlation_id, "req-123");
        assert_eq!(events[0].shopper_id, "uid-42");
        assert_eq!(events[0].attempt, Some(AttemptToken(1)));
        assert!(events[0].metadata.contains_key("from"));
    }

    #[test]
    fn with_attempt_keeps_identity_fields() {
        let base = AuditContext::new("uid-1", None, "req-1", "runtime");
        let scoped = base.with_attempt(AttemptToken(7));
        assert_eq!(scoped.shopper_id, "uid-1");
        assert_eq!(scoped.attempt, Some(AttemptToken(7)));
        assert_eq!(base.attempt, None);
    }

    #[test]
    fn tracing_sink_accepts_events_without_subscriber() {
        let context = AuditContext::new("uid-1", None, "req-1", "runtime");
        TracingAuditSink.emit(AuditEvent::from_context(
            &context,
            "payment.declined",
            AuditCategory::Payment,
            AuditOutcome::Rejected,
        ));
    }
}
