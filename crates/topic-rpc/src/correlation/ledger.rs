use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::time::Instant;
use tracing::trace;

use super::CorrelationKey;

/// Terminal result a waiter observes. Exactly one is delivered per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Resolved(T),
    TimedOut { deadline: Instant },
    Cancelled,
}

impl<T> Outcome<T> {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Outcome::Resolved(_))
    }

    pub fn into_payload(self) -> Option<T> {
        match self {
            Outcome::Resolved(payload) => Some(payload),
            _ => None,
        }
    }
}

/// What happened to an inbound reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// No request in `Sent` carries this key: another client's reply, or a
    /// repeat of one already settled.
    Unmatched,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("correlation key {0} is already pending")]
    DuplicateKey(CorrelationKey),
}

struct PendingRequest<T> {
    issued_at: Instant,
    slot: oneshot::Sender<Outcome<T>>,
}

type PendingMap<T> = Mutex<HashMap<CorrelationKey, PendingRequest<T>>>;

/// In-flight requests of one client, keyed by correlation key.
///
/// An entry exists only while its request is `Sent`. Every transition out of
/// `Sent` removes the entry under the lock, so whichever of resolve, expire or
/// cancel gets there first wins and the rest find nothing. The outcome is
/// published after the lock is released and never waits on the receiver.
pub struct CorrelationLedger<T> {
    pending: Arc<PendingMap<T>>,
}

impl<T> Clone for CorrelationLedger<T> {
    fn clone(&self) -> Self {
        Self {
            pending: Arc::clone(&self.pending),
        }
    }
}

impl<T> Default for CorrelationLedger<T> {
    fn default() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<T> CorrelationLedger<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, key: CorrelationKey) -> Result<RequestHandle<T>, LedgerError> {
        let issued_at = Instant::now();
        let (slot, rx) = oneshot::channel();
        match self.pending.lock().entry(key) {
            Entry::Occupied(_) => return Err(LedgerError::DuplicateKey(key)),
            Entry::Vacant(vacant) => {
                vacant.insert(PendingRequest { issued_at, slot });
            }
        }
        trace!(target = "rpc.ledger", %key, "request registered");
        Ok(RequestHandle {
            key,
            issued_at,
            rx,
            pending: Arc::downgrade(&self.pending),
        })
    }

    pub fn resolve(&self, key: CorrelationKey, payload: T) -> Delivery {
        if settle(&self.pending, &key, Outcome::Resolved(payload)) {
            trace!(target = "rpc.ledger", %key, "request resolved");
            Delivery::Delivered
        } else {
            trace!(target = "rpc.ledger", %key, "reply unmatched");
            Delivery::Unmatched
        }
    }

    pub fn cancel(&self, key: CorrelationKey) -> bool {
        settle(&self.pending, &key, Outcome::Cancelled)
    }

    pub fn expire(&self, key: CorrelationKey, deadline: Instant) -> bool {
        settle(&self.pending, &key, Outcome::TimedOut { deadline })
    }

    /// Times out every request issued at least `timeout` before `now`. A
    /// deadline past the end of the clock is never overdue.
    pub fn expire_overdue(&self, now: Instant, timeout: Duration) -> usize {
        let overdue: Vec<(Instant, PendingRequest<T>)> = {
            let mut pending = self.pending.lock();
            let keys: Vec<(CorrelationKey, Instant)> = pending
                .iter()
                .filter_map(|(key, request)| {
                    let deadline = request.issued_at.checked_add(timeout)?;
                    (deadline <= now).then_some((*key, deadline))
                })
                .collect();
            keys.into_iter()
                .filter_map(|(key, deadline)| {
                    pending.remove(&key).map(|request| (deadline, request))
                })
                .collect()
        };
        let count = overdue.len();
        for (deadline, request) in overdue {
            let _ = request.slot.send(Outcome::TimedOut { deadline });
        }
        count
    }

    /// Cancels everything still pending. Used when the owning client goes away.
    pub fn shutdown(&self) -> usize {
        let drained: Vec<PendingRequest<T>> =
            self.pending.lock().drain().map(|(_, request)| request).collect();
        let count = drained.len();
        for request in drained {
            let _ = request.slot.send(Outcome::Cancelled);
        }
        count
    }

    pub fn contains(&self, key: &CorrelationKey) -> bool {
        self.pending.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

fn settle<T>(pending: &PendingMap<T>, key: &CorrelationKey, outcome: Outcome<T>) -> bool {
    let entry = pending.lock().remove(key);
    match entry {
        Some(request) => {
            // The waiter may have stopped listening; that is not our problem.
            let _ = request.slot.send(outcome);
            true
        }
        None => false,
    }
}

/// The issuing caller's side of one pending request.
///
/// Dropping the handle while the request is still `Sent` cancels it.
pub struct RequestHandle<T> {
    key: CorrelationKey,
    issued_at: Instant,
    rx: oneshot::Receiver<Outcome<T>>,
    pending: Weak<PendingMap<T>>,
}

impl<T> RequestHandle<T> {
    pub fn key(&self) -> CorrelationKey {
        self.key
    }

    pub fn issued_at(&self) -> Instant {
        self.issued_at
    }

    /// Non-blocking check. Hands the handle back while the request is `Sent`.
    pub fn try_outcome(mut self) -> Result<Outcome<T>, Self> {
        match self.rx.try_recv() {
            Ok(outcome) => Ok(outcome),
            Err(TryRecvError::Empty) => Err(self),
            Err(TryRecvError::Closed) => Ok(Outcome::Cancelled),
        }
    }

    pub async fn outcome(mut self) -> Outcome<T> {
        (&mut self.rx).await.unwrap_or(Outcome::Cancelled)
    }

    /// Waits until `issued_at + timeout`, then expires the request. A reply
    /// that beats the expiry still wins. A timeout too large to form a
    /// deadline waits without one.
    pub async fn outcome_within(mut self, timeout: Duration) -> Outcome<T> {
        let Some(deadline) = self.issued_at.checked_add(timeout) else {
            return self.outcome().await;
        };
        match tokio::time::timeout_at(deadline, &mut self.rx).await {
            Ok(received) => received.unwrap_or(Outcome::Cancelled),
            Err(_) => {
                if let Some(pending) = self.pending.upgrade() {
                    settle(&pending, &self.key, Outcome::TimedOut { deadline });
                }
                // Whoever removed the entry sends right after releasing the
                // lock, so the slot may still be empty here.
                (&mut self.rx).await.unwrap_or(Outcome::Cancelled)
            }
        }
    }
}

impl<T> Drop for RequestHandle<T> {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.upgrade() {
            if pending.lock().remove(&self.key).is_some() {
                trace!(target = "rpc.ledger", key = %self.key, "request abandoned");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;

    use super::*;
    use crate::correlation::{ClientGuid, SequenceNumber};

    fn key(seq: u64) -> CorrelationKey {
        CorrelationKey::new(ClientGuid::from_bytes([7; 16]), SequenceNumber::new(seq))
    }

    fn settled<T>(handle: RequestHandle<T>) -> Outcome<T> {
        match handle.try_outcome() {
            Ok(outcome) => outcome,
            Err(_) => panic!("request still pending"),
        }
    }

    #[test_timeout::timeout]
    fn resolve_delivers_payload_once() {
        let ledger = CorrelationLedger::new();
        let handle = ledger.register(key(1)).unwrap();
        assert_eq!(ledger.resolve(key(1), "first"), Delivery::Delivered);
        assert_eq!(ledger.resolve(key(1), "second"), Delivery::Unmatched);
        assert_eq!(settled(handle), Outcome::Resolved("first"));
        assert!(ledger.is_empty());
    }

    #[test_timeout::timeout]
    fn unknown_reply_is_ignored() {
        let ledger = CorrelationLedger::new();
        let handle = ledger.register(key(1)).unwrap();
        assert_eq!(ledger.resolve(key(2), 99), Delivery::Unmatched);
        let handle = handle.try_outcome().err().expect("still pending");
        assert!(ledger.contains(&handle.key()));
    }

    #[test_timeout::timeout]
    fn duplicate_key_is_rejected_until_settled() {
        let ledger = CorrelationLedger::<u32>::new();
        let _first = ledger.register(key(1)).unwrap();
        assert_eq!(
            ledger.register(key(1)).err(),
            Some(LedgerError::DuplicateKey(key(1)))
        );
        assert_eq!(ledger.len(), 1);
        ledger.resolve(key(1), 5);
        assert!(ledger.register(key(1)).is_ok());
    }

    #[test_timeout::timeout]
    fn cancel_and_expire_are_terminal() {
        let ledger = CorrelationLedger::new();
        let cancelled = ledger.register(key(1)).unwrap();
        let expired = ledger.register(key(2)).unwrap();
        let deadline = Instant::now();

        assert!(ledger.cancel(key(1)));
        assert!(ledger.expire(key(2), deadline));
        assert!(!ledger.cancel(key(2)));
        assert_eq!(ledger.resolve(key(1), "late"), Delivery::Unmatched);

        assert_eq!(settled(cancelled), Outcome::Cancelled);
        assert_eq!(settled(expired), Outcome::TimedOut { deadline });
    }

    #[test_timeout::timeout]
    fn dropped_handle_cancels_entry() {
        let ledger = CorrelationLedger::new();
        let handle = ledger.register(key(1)).unwrap();
        drop(handle);
        assert!(!ledger.contains(&key(1)));
        assert_eq!(ledger.resolve(key(1), ()), Delivery::Unmatched);
    }

    #[test_timeout::timeout]
    fn shutdown_cancels_everything() {
        let ledger = CorrelationLedger::<u8>::new();
        let handles: Vec<_> = (1..=3).map(|n| ledger.register(key(n)).unwrap()).collect();
        assert_eq!(ledger.shutdown(), 3);
        for handle in handles {
            assert_eq!(settled(handle), Outcome::Cancelled);
        }
    }

    #[test_timeout::timeout]
    fn dropped_ledger_reads_as_cancelled() {
        let ledger = CorrelationLedger::<u8>::new();
        let handle = ledger.register(key(1)).unwrap();
        drop(ledger);
        assert_eq!(settled(handle), Outcome::Cancelled);
    }

    #[test_timeout::timeout]
    fn overdue_sweep_respects_timeout() {
        let ledger = CorrelationLedger::<u8>::new();
        let handle = ledger.register(key(1)).unwrap();
        let issued_at = handle.issued_at();

        assert_eq!(ledger.expire_overdue(issued_at, Duration::from_secs(60)), 0);
        let later = issued_at + Duration::from_secs(61);
        assert_eq!(ledger.expire_overdue(later, Duration::from_secs(60)), 1);
        assert_eq!(
            settled(handle),
            Outcome::TimedOut {
                deadline: issued_at + Duration::from_secs(60)
            }
        );
    }

    #[test_timeout::timeout(30)]
    fn racing_resolve_and_expire_settle_exactly_once() {
        for seq in 0..500 {
            let ledger = CorrelationLedger::new();
            let handle = ledger.register(key(seq)).unwrap();
            let barrier = Arc::new(Barrier::new(2));
            let deadline = Instant::now();

            let resolver = {
                let ledger = ledger.clone();
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    ledger.resolve(key(seq), seq)
                })
            };
            let expirer = {
                let ledger = ledger.clone();
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    ledger.expire(key(seq), deadline)
                })
            };
            let resolved = resolver.join().unwrap() == Delivery::Delivered;
            let expired = expirer.join().unwrap();

            assert!(resolved ^ expired, "exactly one transition must win");
            match settled(handle) {
                Outcome::Resolved(value) => {
                    assert!(resolved);
                    assert_eq!(value, seq);
                }
                Outcome::TimedOut { .. } => assert!(expired),
                Outcome::Cancelled => panic!("nobody cancelled"),
            }
        }
    }

    #[test_timeout::timeout(60)]
    fn deadline_racing_a_reply_never_reads_cancelled() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        for seq in 0..2_000 {
            let ledger = CorrelationLedger::new();
            let handle = ledger.register(key(seq)).unwrap();
            let barrier = Arc::new(Barrier::new(2));

            let resolver = {
                let ledger = ledger.clone();
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    ledger.resolve(key(seq), seq)
                })
            };
            barrier.wait();
            let outcome = runtime.block_on(handle.outcome_within(Duration::ZERO));
            let delivered = resolver.join().unwrap() == Delivery::Delivered;

            match outcome {
                Outcome::Resolved(value) => {
                    assert!(delivered);
                    assert_eq!(value, seq);
                }
                Outcome::TimedOut { .. } => assert!(!delivered),
                Outcome::Cancelled => panic!("nobody cancelled request {seq}"),
            }
        }
    }

    #[test_timeout::tokio_timeout_test(10)]
    async fn unbounded_timeout_waits_for_reply() {
        let ledger = CorrelationLedger::new();
        let settled_first = ledger.register(key(1)).unwrap();
        ledger.resolve(key(1), 7);
        assert_eq!(
            settled_first.outcome_within(Duration::MAX).await,
            Outcome::Resolved(7)
        );

        let waiting = ledger.register(key(2)).unwrap();
        let replier = ledger.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            replier.resolve(key(2), 8);
        });
        assert_eq!(
            waiting.outcome_within(Duration::MAX).await,
            Outcome::Resolved(8)
        );
    }

    #[test_timeout::timeout]
    fn unbounded_timeout_is_never_overdue() {
        let ledger = CorrelationLedger::<u8>::new();
        let handle = ledger.register(key(1)).unwrap();
        let later = handle.issued_at() + Duration::from_secs(3_600);
        assert_eq!(ledger.expire_overdue(later, Duration::MAX), 0);
        assert!(ledger.contains(&key(1)));
        assert_eq!(ledger.expire_overdue(later, Duration::from_secs(1)), 1);
        assert!(matches!(settled(handle), Outcome::TimedOut { .. }));
    }

    #[test_timeout::tokio_timeout_test(10)]
    async fn outcome_within_reports_timeout() {
        let ledger = CorrelationLedger::<u8>::new();
        let handle = ledger.register(key(1)).unwrap();
        let issued_at = handle.issued_at();
        let outcome = handle.outcome_within(Duration::from_millis(20)).await;
        assert_eq!(
            outcome,
            Outcome::TimedOut {
                deadline: issued_at + Duration::from_millis(20)
            }
        );
        assert!(ledger.is_empty());
    }

    #[test_timeout::tokio_timeout_test(10)]
    async fn outcome_within_returns_reply_before_deadline() {
        let ledger = CorrelationLedger::new();
        let handle = ledger.register(key(1)).unwrap();
        let replier = ledger.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            replier.resolve(key(1), "pong");
        });
        let outcome = handle.outcome_within(Duration::from_secs(5)).await;
        assert_eq!(outcome, Outcome::Resolved("pong"));
    }
}
