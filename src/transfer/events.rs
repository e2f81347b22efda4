//! Post-commit ledger events
//!
//! Committed entries are announced on a bounded in-process queue for
//! notification layers (websocket push, SMS fan-out) to drain. The
//! queue is strictly best-effort: publishing happens after the store
//! commit, never gates it, and a full queue drops the event with a
//! counter bump instead of blocking the transfer path.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_queue::ArrayQueue;
use tracing::warn;

use crate::ledger::models::{Applied, LedgerEvent};

pub struct EventSink {
    queue: ArrayQueue<LedgerEvent>,
    dropped: AtomicU64,
}

impl EventSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity.max(1)),
            dropped: AtomicU64::new(0),
        }
    }

    /// Publish the committed plan. Replays publish nothing; the
    /// original commit already did.
    pub fn publish(&self, applied: &Applied) {
        if applied.replayed {
            return;
        }
        let Some(event) = LedgerEvent::from_applied(applied) else {
            return;
        };
        if self.queue.push(event).is_err() {
            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(dropped = total, "ledger event queue full, dropping event");
        }
    }

    pub fn pop(&self) -> Option<LedgerEvent> {
        self.queue.pop()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Events lost to a full queue since startup
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::{EntryId, WalletId};
    use crate::fee::FeeBreakdown;
    use crate::ledger::models::{EntryStatus, EntryType, LedgerEntry, WalletSnapshot};
    use crate::money::Currency;
    use chrono::Utc;

    fn applied(replayed: bool) -> Applied {
        let from = WalletId::new();
        let to = WalletId::new();
        Applied {
            entries: vec![LedgerEntry {
                id: EntryId::new(),
                idempotency_key: "evt-test".into(),
                entry_type: EntryType::Transfer,
                from_wallet_id: Some(from),
                to_wallet_id: Some(to),
                amount: 500,
                currency: Currency::Gnf,
                fee: FeeBreakdown::free(500),
                status: EntryStatus::Completed,
                converted_amount: None,
                exchange_rate: None,
                reversal_of: None,
                created_at: Utc::now(),
            }],
            replayed,
            wallets: vec![
                WalletSnapshot {
                    wallet_id: from,
                    avail: 100,
                    held: 0,
                    version: 2,
                },
                WalletSnapshot {
                    wallet_id: to,
                    avail: 500,
                    held: 0,
                    version: 1,
                },
            ],
        }
    }

    #[test]
    fn test_publishes_committed_plan() {
        let sink = EventSink::new(8);
        sink.publish(&applied(false));

        assert_eq!(sink.len(), 1);
        let event = sink.pop().unwrap();
        assert_eq!(event.entry_type, EntryType::Transfer);
        assert_eq!(event.amount, 500);
        assert_eq!(event.wallets.len(), 2);
        assert!(sink.pop().is_none());
    }

    #[test]
    fn test_replay_publishes_nothing() {
        let sink = EventSink::new(8);
        sink.publish(&applied(true));
        assert!(sink.is_empty());
        assert_eq!(sink.dropped(), 0);
    }

    #[test]
    fn test_full_queue_drops_and_counts() {
        let sink = EventSink::new(1);
        sink.publish(&applied(false));
        sink.publish(&applied(false));
        sink.publish(&applied(false));

        assert_eq!(sink.len(), 1);
        assert_eq!(sink.dropped(), 2);
    }
}
