//! Partner-scoped invoice numbering
//!
//! Invoice numbers take the form `INV-{partner}-{sequence}` where the
//! sequence increases monotonically per partner. Allocation is serialized
//! behind one mutex so that concurrent issuance for the same partner can
//! never hand out the same sequence twice; the persistence layer achieves
//! the same with a row lock over the partner's current maximum.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use core_kernel::PartnerId;

/// Serialized per-partner sequence allocator
#[derive(Debug, Default)]
pub struct InvoiceNumbering {
    counters: Mutex<HashMap<PartnerId, u64>>,
}

impl InvoiceNumbering {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a partner's counter from the highest sequence already issued
    ///
    /// Idempotent: a lower seed than the current counter is ignored.
    pub fn seed(&self, partner_id: PartnerId, highest_sequence: u64) {
        let mut counters = self.lock();
        let entry = counters.entry(partner_id).or_insert(0);
        *entry = (*entry).max(highest_sequence);
    }

    /// Allocates the next sequence for a partner
    pub fn allocate(&self, partner_id: PartnerId) -> u64 {
        let mut counters = self.lock();
        let entry = counters.entry(partner_id).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Allocates and formats the next invoice number for a partner
    pub fn next_number(&self, partner_id: PartnerId) -> String {
        Self::format(partner_id, self.allocate(partner_id))
    }

    /// Renders `INV-{partner}-{sequence}`
    pub fn format(partner_id: PartnerId, sequence: u64) -> String {
        format!("INV-{}-{}", partner_id.as_uuid().simple(), sequence)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PartnerId, u64>> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_sequences_are_monotonic_per_partner() {
        let numbering = InvoiceNumbering::new();
        let partner = PartnerId::new();

        assert_eq!(numbering.allocate(partner), 1);
        assert_eq!(numbering.allocate(partner), 2);
        assert_eq!(numbering.allocate(partner), 3);
    }

    #[test]
    fn test_partners_count_independently() {
        let numbering = InvoiceNumbering::new();
        let a = PartnerId::new();
        let b = PartnerId::new();

        numbering.allocate(a);
        numbering.allocate(a);
        assert_eq!(numbering.allocate(b), 1);
    }

    #[test]
    fn test_seed_resumes_from_existing_numbers() {
        let numbering = InvoiceNumbering::new();
        let partner = PartnerId::new();

        numbering.seed(partner, 41);
        assert_eq!(numbering.allocate(partner), 42);

        // Re-seeding lower must not rewind the counter.
        numbering.seed(partner, 10);
        assert_eq!(numbering.allocate(partner), 43);
    }

    #[test]
    fn test_number_format() {
        let partner = PartnerId::new();
        let number = InvoiceNumbering::format(partner, 7);

        assert!(number.starts_with("INV-"));
        assert!(number.ends_with("-7"));
        assert!(number.contains(&partner.as_uuid().simple().to_string()));
    }

    #[test]
    fn test_concurrent_allocation_is_collision_free() {
        let numbering = Arc::new(InvoiceNumbering::new());
        let partner = PartnerId::new();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let numbering = Arc::clone(&numbering);
                thread::spawn(move || (0..25).map(|_| numbering.allocate(partner)).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for sequence in handle.join().unwrap() {
                assert!(seen.insert(sequence), "duplicate sequence {sequence}");
            }
        }
        assert_eq!(seen.len(), 200);
    }
}
