//! In-memory operation registry
//!
//! The registry is the sole owner of [`OperationRecord`]s. The poller, the
//! progress stream and the download handler all go through it, and every
//! mutation happens under a single write lock so a record is never written
//! by two components at once.
//!
//! Each record has at most one subscriber. State changes applied through
//! [`OperationRegistry::update`] are translated into [`ProgressEvent`]s and
//! pushed to that subscriber while the lock is still held, so a subscriber
//! that took a snapshot never misses or double-receives a change.

use crate::error::{Error, OperationError, Result};
use crate::types::{ArtifactLocator, JobHandle, OperationId, OperationRecord, ProgressEvent};
use chrono::Utc;
use futures::StreamExt;
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};
use tokio_stream::wrappers::ReceiverStream;

/// A live subscription to one operation's progress events
#[derive(Debug)]
pub struct Subscription {
    /// Record as it was when the subscription was installed
    pub snapshot: OperationRecord,
    /// Events for every change applied after `snapshot`
    pub receiver: mpsc::Receiver<ProgressEvent>,
}

impl Subscription {
    /// The event sequence a subscriber sees
    ///
    /// `connected` first, then a catch-up event derived from the snapshot,
    /// then live events. The sequence ends after the first `complete` or
    /// `error`, or when the registry drops the subscription.
    pub fn into_events(self) -> BoxStream<'static, ProgressEvent> {
        let mut head = vec![ProgressEvent::connected(self.snapshot.id)];
        head.extend(ProgressEvent::for_snapshot(&self.snapshot));

        if head.last().is_some_and(ProgressEvent::closes_stream) {
            return futures::stream::iter(head).boxed();
        }

        // The registry drops the sender right after a closing event
        futures::stream::iter(head)
            .chain(ReceiverStream::new(self.receiver))
            .boxed()
    }
}

struct Slot {
    record: OperationRecord,
    subscriber: Option<mpsc::Sender<ProgressEvent>>,
}

/// Concurrency-safe map from operation ID to its record
#[derive(Clone)]
pub struct OperationRegistry {
    slots: Arc<RwLock<HashMap<OperationId, Slot>>>,
    event_buffer: usize,
}

impl OperationRegistry {
    /// Create an empty registry; each subscriber channel holds `event_buffer` events
    ///
    /// One slot is reserved for the closing event, so the buffer holds at least two.
    pub fn new(event_buffer: usize) -> Self {
        Self {
            slots: Arc::new(RwLock::new(HashMap::new())),
            event_buffer: event_buffer.max(2),
        }
    }

    /// Install a new `Pending` record under a fresh ID
    pub async fn create(&self, job_handle: JobHandle, locator: ArtifactLocator) -> OperationId {
        let id = OperationId::new();
        let mut slots = self.slots.write().await;
        slots.insert(
            id,
            Slot {
                record: OperationRecord::new(id, job_handle, locator),
                subscriber: None,
            },
        );
        id
    }

    /// Install a record whose ID was chosen by the caller
    ///
    /// Used when the artifact locator is derived from the ID before the job
    /// is started.
    pub async fn insert(&self, record: OperationRecord) -> Result<()> {
        let mut slots = self.slots.write().await;
        if slots.contains_key(&record.id) {
            return Err(Error::Other(format!(
                "operation {} is already registered",
                record.id
            )));
        }
        slots.insert(
            record.id,
            Slot {
                record,
                subscriber: None,
            },
        );
        Ok(())
    }

    /// Current record for `id`
    pub async fn get(&self, id: OperationId) -> Result<OperationRecord> {
        let slots = self.slots.read().await;
        slots
            .get(&id)
            .map(|slot| slot.record.clone())
            .ok_or_else(|| OperationError::NotFound { id }.into())
    }

    /// Apply an atomic in-place mutation and notify the subscriber
    ///
    /// The mutator works on a copy; the copy replaces the record only if it
    /// keeps the state machine moving forward. Identity fields are restored
    /// and progress never decreases. Returns the updated record.
    pub async fn update<F>(&self, id: OperationId, mutate: F) -> Result<OperationRecord>
    where
        F: FnOnce(&mut OperationRecord),
    {
        let mut slots = self.slots.write().await;
        let slot = slots
            .get_mut(&id)
            .ok_or(OperationError::NotFound { id })?;

        let before = slot.record.clone();
        let mut after = before.clone();
        mutate(&mut after);

        after.id = before.id;
        after.job_handle = before.job_handle.clone();
        after.artifact_locator = before.artifact_locator.clone();
        after.created_at = before.created_at;
        after.purge_claimed = before.purge_claimed;

        let moves_backwards = after.state.rank() < before.state.rank();
        let leaves_terminal = before.state.is_terminal() && after.state != before.state;
        if moves_backwards || leaves_terminal {
            return Err(OperationError::InvalidTransition {
                id,
                from: before.state,
                to: after.state,
            }
            .into());
        }

        after.progress_percent = after.progress_percent.min(100).max(before.progress_percent);

        let changed = after.state != before.state
            || after.progress_percent != before.progress_percent
            || after.last_error != before.last_error;
        if changed {
            after.updated_at = Utc::now();
        } else {
            after.updated_at = before.updated_at;
        }

        let events = ProgressEvent::for_transition(&before, &after);
        slot.record = after.clone();
        deliver(id, slot, events);

        Ok(after)
    }

    /// Install a fresh subscriber channel for `id`
    ///
    /// A previous subscriber is dropped, which ends its stream.
    pub async fn subscribe(&self, id: OperationId) -> Result<Subscription> {
        let mut slots = self.slots.write().await;
        let slot = slots
            .get_mut(&id)
            .ok_or(OperationError::NotFound { id })?;

        let (tx, rx) = mpsc::channel(self.event_buffer);
        if slot.subscriber.replace(tx).is_some() {
            tracing::debug!(operation_id = %id, "Replacing existing progress subscriber");
        }

        Ok(Subscription {
            snapshot: slot.record.clone(),
            receiver: rx,
        })
    }

    /// Claim the right to purge the artifact of `id`
    ///
    /// Returns `true` for exactly one caller; every later claim, and any
    /// claim on an unknown ID, returns `false`.
    pub async fn claim_purge(&self, id: OperationId) -> bool {
        let mut slots = self.slots.write().await;
        match slots.get_mut(&id) {
            Some(slot) if !slot.record.purge_claimed => {
                slot.record.purge_claimed = true;
                true
            }
            _ => false,
        }
    }

    /// Whether a download outcome has already claimed the purge of `id`
    pub async fn is_purge_claimed(&self, id: OperationId) -> bool {
        let slots = self.slots.read().await;
        slots
            .get(&id)
            .map(|slot| slot.record.purge_claimed)
            .unwrap_or(false)
    }

    /// Retire the record, closing any subscriber stream
    pub async fn remove(&self, id: OperationId) -> Option<OperationRecord> {
        let mut slots = self.slots.write().await;
        slots.remove(&id).map(|slot| slot.record)
    }

    /// Number of tracked operations
    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    /// Whether no operations are tracked
    pub async fn is_empty(&self) -> bool {
        self.slots.read().await.is_empty()
    }
}

/// Push `events` to the subscriber of `slot`
///
/// The last free slot of the channel is kept for the closing event, so a
/// subscriber that falls behind loses `progress` events but always receives
/// `complete` or `error`.
fn deliver(id: OperationId, slot: &mut Slot, events: Vec<ProgressEvent>) {
    for event in events {
        let Some(sender) = slot.subscriber.as_ref() else {
            return;
        };

        if sender.is_closed() {
            tracing::debug!(operation_id = %id, "Progress subscriber disconnected");
            slot.subscriber = None;
            return;
        }

        let closes = event.closes_stream();
        if !closes && sender.capacity() <= 1 {
            tracing::warn!(
                operation_id = %id,
                event = event.name(),
                "Progress subscriber is not keeping up, dropping event"
            );
            continue;
        }

        match sender.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                // Only reachable for a closing event; hand it off instead of dropping it
                let sender = sender.clone();
                tokio::spawn(async move {
                    let _ = sender.send(event).await;
                });
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(operation_id = %id, "Progress subscriber disconnected");
                slot.subscriber = None;
                return;
            }
        }

        if closes {
            slot.subscriber = None;
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OperationState;

    fn registry() -> OperationRegistry {
        OperationRegistry::new(8)
    }

    async fn create(registry: &OperationRegistry) -> OperationId {
        registry
            .create(
                JobHandle("projects/p/locations/global/operations/1".into()),
                ArtifactLocator::new("bucket", "a.mp3"),
            )
            .await
    }

    #[tokio::test]
    async fn create_installs_pending_record() {
        let registry = registry();
        let id = create(&registry).await;

        let record = registry.get(id).await.unwrap();
        assert_eq!(record.id, id);
        assert_eq!(record.state, OperationState::Pending);
        assert_eq!(record.progress_percent, 0);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let registry = registry();
        let id = OperationId::new();

        assert!(matches!(
            registry.get(id).await,
            Err(Error::Operation(OperationError::NotFound { .. }))
        ));
        assert!(matches!(
            registry.update(id, |_| {}).await,
            Err(Error::Operation(OperationError::NotFound { .. }))
        ));
        assert!(registry.subscribe(id).await.is_err());
        assert!(registry.remove(id).await.is_none());
        assert!(!registry.claim_purge(id).await);
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_id() {
        let registry = registry();
        let id = create(&registry).await;
        let duplicate = OperationRecord::new(
            id,
            JobHandle("other".into()),
            ArtifactLocator::new("bucket", "b.mp3"),
        );

        assert!(registry.insert(duplicate).await.is_err());
        assert_eq!(
            registry.get(id).await.unwrap().job_handle.0,
            "projects/p/locations/global/operations/1"
        );
    }

    #[tokio::test]
    async fn update_keeps_progress_monotonic_and_identity_fixed() {
        let registry = registry();
        let id = create(&registry).await;

        registry
            .update(id, |r| {
                r.state = OperationState::Running;
                r.progress_percent = 40;
            })
            .await
            .unwrap();

        let record = registry
            .update(id, |r| {
                r.progress_percent = 10;
                r.artifact_locator = ArtifactLocator::new("elsewhere", "x.mp3");
            })
            .await
            .unwrap();

        assert_eq!(record.progress_percent, 40);
        assert_eq!(record.artifact_locator.bucket, "bucket");
    }

    #[tokio::test]
    async fn update_rejects_leaving_terminal_state() {
        let registry = registry();
        let id = create(&registry).await;
        registry
            .update(id, |r| r.state = OperationState::Ready)
            .await
            .unwrap();

        let err = registry
            .update(id, |r| r.state = OperationState::Running)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Operation(OperationError::InvalidTransition { .. })
        ));

        let err = registry
            .update(id, |r| r.state = OperationState::Failed)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Operation(OperationError::InvalidTransition { .. })
        ));
        assert_eq!(registry.get(id).await.unwrap().state, OperationState::Ready);
    }

    #[tokio::test]
    async fn polling_error_can_recover_to_running() {
        let registry = registry();
        let id = create(&registry).await;
        registry
            .update(id, |r| r.state = OperationState::PollingError)
            .await
            .unwrap();

        let record = registry
            .update(id, |r| r.state = OperationState::Running)
            .await
            .unwrap();
        assert_eq!(record.state, OperationState::Running);
    }

    #[tokio::test]
    async fn subscriber_receives_changes_after_snapshot() {
        let registry = registry();
        let id = create(&registry).await;

        let mut sub = registry.subscribe(id).await.unwrap();
        assert_eq!(sub.snapshot.state, OperationState::Pending);

        registry
            .update(id, |r| {
                r.state = OperationState::Running;
                r.progress_percent = 15;
            })
            .await
            .unwrap();
        registry
            .update(id, |r| {
                r.state = OperationState::Ready;
                r.progress_percent = 100;
            })
            .await
            .unwrap();

        let mut names = Vec::new();
        while let Some(event) = sub.receiver.recv().await {
            names.push(event.name());
        }
        assert_eq!(names, vec!["progress", "progress", "complete"]);
    }

    #[tokio::test]
    async fn last_subscriber_wins() {
        let registry = registry();
        let id = create(&registry).await;

        let mut first = registry.subscribe(id).await.unwrap();
        let mut second = registry.subscribe(id).await.unwrap();

        registry
            .update(id, |r| {
                r.state = OperationState::Running;
                r.progress_percent = 5;
            })
            .await
            .unwrap();

        assert!(first.receiver.recv().await.is_none());
        assert_eq!(second.receiver.recv().await.unwrap().name(), "progress");
    }

    #[tokio::test]
    async fn dropped_subscriber_does_not_block_updates() {
        let registry = registry();
        let id = create(&registry).await;

        let sub = registry.subscribe(id).await.unwrap();
        drop(sub);

        for p in 1..=20u8 {
            registry
                .update(id, |r| {
                    r.state = OperationState::Running;
                    r.progress_percent = p;
                })
                .await
                .unwrap();
        }
        assert_eq!(registry.get(id).await.unwrap().progress_percent, 20);
    }

    #[tokio::test]
    async fn slow_subscriber_drops_overflow_without_failing_update() {
        let registry = OperationRegistry::new(3);
        let id = create(&registry).await;
        let mut sub = registry.subscribe(id).await.unwrap();

        for p in 1..=5u8 {
            registry
                .update(id, |r| {
                    r.state = OperationState::Running;
                    r.progress_percent = p * 10;
                })
                .await
                .unwrap();
        }

        assert_eq!(
            sub.receiver.recv().await,
            Some(ProgressEvent::Progress { id, percentage: 10 })
        );
        assert_eq!(
            sub.receiver.recv().await,
            Some(ProgressEvent::Progress { id, percentage: 20 })
        );
        assert!(sub.receiver.try_recv().is_err());
        assert_eq!(registry.get(id).await.unwrap().progress_percent, 50);
    }

    #[tokio::test]
    async fn full_buffer_still_delivers_complete() {
        let registry = OperationRegistry::new(2);
        let id = create(&registry).await;
        let sub = registry.subscribe(id).await.unwrap();

        for p in [10u8, 20, 30] {
            registry
                .update(id, |r| {
                    r.state = OperationState::Running;
                    r.progress_percent = p;
                })
                .await
                .unwrap();
        }
        registry
            .update(id, |r| {
                r.state = OperationState::Ready;
                r.progress_percent = 100;
            })
            .await
            .unwrap();

        let names: Vec<_> = sub.into_events().map(|e| e.name()).collect().await;
        assert_eq!(names.first(), Some(&"connected"));
        assert_eq!(names.last(), Some(&"complete"));
    }

    #[tokio::test]
    async fn full_buffer_still_delivers_error() {
        let registry = OperationRegistry::new(2);
        let id = create(&registry).await;
        let mut sub = registry.subscribe(id).await.unwrap();

        for p in [10u8, 20, 30] {
            registry
                .update(id, |r| {
                    r.state = OperationState::Running;
                    r.progress_percent = p;
                })
                .await
                .unwrap();
        }
        registry
            .update(id, |r| {
                r.state = OperationState::Failed;
                r.last_error = Some("Voice not supported".into());
            })
            .await
            .unwrap();

        assert_eq!(
            sub.receiver.recv().await,
            Some(ProgressEvent::Progress { id, percentage: 10 })
        );
        assert!(matches!(
            sub.receiver.recv().await,
            Some(ProgressEvent::Error { transient: false, .. })
        ));
        assert_eq!(sub.receiver.recv().await, None);
    }

    #[tokio::test]
    async fn event_stream_starts_with_connected_and_catch_up() {
        let registry = registry();
        let id = create(&registry).await;
        registry
            .update(id, |r| {
                r.state = OperationState::Running;
                r.progress_percent = 30;
            })
            .await
            .unwrap();

        let events = registry.subscribe(id).await.unwrap().into_events();
        registry
            .update(id, |r| {
                r.state = OperationState::Ready;
                r.progress_percent = 100;
            })
            .await
            .unwrap();

        let names: Vec<_> = events.map(|e| e.name()).collect().await;
        assert_eq!(
            names,
            vec!["connected", "progress", "progress", "complete"]
        );
    }

    #[tokio::test]
    async fn event_stream_for_terminal_record_closes_after_catch_up() {
        let registry = registry();
        let id = create(&registry).await;
        registry
            .update(id, |r| {
                r.state = OperationState::Failed;
                r.last_error = Some("quota exceeded".into());
            })
            .await
            .unwrap();

        let events: Vec<_> = registry
            .subscribe(id)
            .await
            .unwrap()
            .into_events()
            .collect()
            .await;

        assert_eq!(events.len(), 2);
        match &events[1] {
            ProgressEvent::Error {
                error, transient, ..
            } => {
                assert_eq!(error, "quota exceeded");
                assert!(!transient);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn purge_is_claimed_once() {
        let registry = registry();
        let id = create(&registry).await;

        assert!(!registry.is_purge_claimed(id).await);
        assert!(registry.claim_purge(id).await);
        assert!(!registry.claim_purge(id).await);
        assert!(registry.is_purge_claimed(id).await);

        // Mutations cannot clear the claim
        registry
            .update(id, |r| r.purge_claimed = false)
            .await
            .unwrap();
        assert!(registry.is_purge_claimed(id).await);
    }

    #[tokio::test]
    async fn remove_closes_subscriber_stream() {
        let registry = registry();
        let id = create(&registry).await;
        let mut sub = registry.subscribe(id).await.unwrap();

        assert!(registry.remove(id).await.is_some());
        assert!(sub.receiver.recv().await.is_none());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn concurrent_updates_on_many_operations_are_isolated() {
        let registry = registry();
        let mut ids = Vec::new();
        for _ in 0..10 {
            ids.push(create(&registry).await);
        }

        let mut handles = Vec::new();
        for (i, id) in ids.iter().copied().enumerate() {
            for p in 1..=10u8 {
                let registry = registry.clone();
                handles.push(tokio::spawn(async move {
                    registry
                        .update(id, |r| {
                            r.state = OperationState::Running;
                            r.progress_percent = p * (i as u8 + 1);
                        })
                        .await
                }));
            }
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        for (i, id) in ids.iter().enumerate() {
            let record = registry.get(*id).await.unwrap();
            assert_eq!(record.progress_percent, (10 * (i as u8 + 1)).min(100));
        }
        assert_eq!(registry.len().await, 10);
    }
}
