//! Audit sink port
//!
//! The ledger emits a structured event on every create or update of a
//! financially relevant entity. Storage of the audit trail is owned by an
//! external collaborator; this module only defines the record shape and the
//! sink trait that adapters implement.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::identifiers::{AuditEventId, PartnerId, UserId};

/// What happened to the entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Created,
    Updated,
}

/// A single audit record
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    /// Unique event identifier
    pub id: AuditEventId,
    /// Owning partner
    pub partner_id: PartnerId,
    /// Acting user, when known
    pub user_id: Option<UserId>,
    /// Create or update
    pub action: AuditAction,
    /// Entity type tag (e.g., "wallet_transaction", "invoice")
    pub entity_type: &'static str,
    /// Entity primary key
    pub entity_id: Uuid,
    /// Entity state before the change (updates only)
    pub old_values: Option<Value>,
    /// Entity state after the change
    pub new_values: Option<Value>,
    /// When the event was emitted
    pub recorded_at: DateTime<Utc>,
}

impl AuditEvent {
    /// Builds a creation event
    pub fn created(
        partner_id: PartnerId,
        user_id: Option<UserId>,
        entity_type: &'static str,
        entity_id: Uuid,
        new_values: Option<Value>,
    ) -> Self {
        Self {
            id: AuditEventId::new_v7(),
            partner_id,
            user_id,
            action: AuditAction::Created,
            entity_type,
            entity_id,
            old_values: None,
            new_values,
            recorded_at: Utc::now(),
        }
    }

    /// Builds an update event
    pub fn updated(
        partner_id: PartnerId,
        user_id: Option<UserId>,
        entity_type: &'static str,
        entity_id: Uuid,
        old_values: Option<Value>,
        new_values: Option<Value>,
    ) -> Self {
        Self {
            id: AuditEventId::new_v7(),
            partner_id,
            user_id,
            action: AuditAction::Updated,
            entity_type,
            entity_id,
            old_values,
            new_values,
            recorded_at: Utc::now(),
        }
    }
}

/// Port implemented by audit trail adapters
pub trait AuditSink: Send + Sync {
    /// Records one event; implementations must not fail the calling operation
    fn record(&self, event: AuditEvent);
}

/// Sink that discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAudit;

impl AuditSink for NoopAudit {
    fn record(&self, _event: AuditEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_created_event_has_no_old_values() {
        let partner = PartnerId::new();
        let event = AuditEvent::created(partner, None, "invoice", Uuid::new_v4(), None);

        assert_eq!(event.action, AuditAction::Created);
        assert!(event.old_values.is_none());
        assert_eq!(event.partner_id, partner);
    }

    #[test]
    fn test_event_serializes() {
        let event = AuditEvent::updated(
            PartnerId::new(),
            Some(UserId::new()),
            "wallet",
            Uuid::new_v4(),
            Some(serde_json::json!({"balance": "100.00"})),
            Some(serde_json::json!({"balance": "50.00"})),
        );

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("wallet"));
    }
}
