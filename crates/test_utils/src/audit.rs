//! Recording audit sink

use std::sync::{Mutex, PoisonError};

use core_kernel::{AuditEvent, AuditSink};

/// An [`AuditSink`] that keeps every event in memory
///
/// Tests assert against `events()` to verify the trail an operation left.
#[derive(Debug, Default)]
pub struct RecordingAudit {
    events: Mutex<Vec<AuditEvent>>,
}

impl RecordingAudit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far, in order
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_empty(&self) -> bool {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }
}

impl AuditSink for RecordingAudit {
    fn record(&self, event: AuditEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::{PartnerId, WalletId};

    #[test]
    fn test_records_in_order() {
        let sink = RecordingAudit::new();
        assert!(sink.is_empty());

        sink.record(AuditEvent::created(
            PartnerId::new(),
            None,
            "wallet",
            *WalletId::new().as_uuid(),
            None,
        ));
        sink.record(AuditEvent::created(
            PartnerId::new(),
            None,
            "invoice",
            *WalletId::new().as_uuid(),
            None,
        ));

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].entity_type, "wallet");
        assert_eq!(events[1].entity_type, "invoice");
    }
}
