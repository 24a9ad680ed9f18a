//! Per-stream projection cursors.
//!
//! A cursor is the last sequence number a projection applied for one
//! `(tenant_id, aggregate_id)` stream. Replays at or below the cursor are
//! skipped, which makes at-least-once delivery safe. Events that arrive ahead
//! of a missing predecessor are parked until the gap is filled, so a stream
//! is always applied from sequence 1 upwards without holes.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use maquila_core::{AggregateId, TenantId};

use super::ProjectionError;

/// Parked events per stream before delivery is considered broken.
pub const MAX_PENDING_PER_STREAM: usize = 1024;

#[derive(Debug)]
struct StreamState<T> {
    applied: u64,
    pending: BTreeMap<u64, T>,
}

impl<T> Default for StreamState<T> {
    fn default() -> Self {
        Self {
            applied: 0,
            pending: BTreeMap::new(),
        }
    }
}

#[derive(Debug)]
pub struct StreamCursors<T> {
    streams: RwLock<HashMap<(TenantId, AggregateId), StreamState<T>>>,
}

impl<T> Default for StreamCursors<T> {
    fn default() -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
        }
    }
}

impl<T: Clone> StreamCursors<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last applied sequence number (0 before the first event).
    pub fn get(&self, tenant_id: TenantId, aggregate_id: AggregateId) -> u64 {
        self.streams
            .read()
            .ok()
            .and_then(|s| s.get(&(tenant_id, aggregate_id)).map(|st| st.applied))
            .unwrap_or(0)
    }

    /// Events parked behind a gap.
    pub fn pending_len(&self, tenant_id: TenantId, aggregate_id: AggregateId) -> usize {
        self.streams
            .read()
            .ok()
            .and_then(|s| s.get(&(tenant_id, aggregate_id)).map(|st| st.pending.len()))
            .unwrap_or(0)
    }

    /// Park `item` at `seq` for later application.
    ///
    /// Returns `Ok(false)` for a duplicate: already applied, or already
    /// parked. Sequence 0 and an overflowing buffer are errors.
    pub fn offer(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        seq: u64,
        item: T,
    ) -> Result<bool, ProjectionError> {
        let mut streams = self.streams.write().map_err(|_| ProjectionError::Poisoned)?;
        let state = streams.entry((tenant_id, aggregate_id)).or_default();

        if seq == 0 {
            return Err(ProjectionError::NonMonotonicSequence {
                last: state.applied,
                found: seq,
            });
        }
        if seq <= state.applied || state.pending.contains_key(&seq) {
            return Ok(false);
        }
        if state.pending.len() >= MAX_PENDING_PER_STREAM {
            return Err(ProjectionError::NonMonotonicSequence {
                last: state.applied,
                found: seq,
            });
        }

        state.pending.insert(seq, item);
        Ok(true)
    }

    /// The parked event directly after the cursor, if it has arrived.
    ///
    /// The item stays parked until [`advance`](Self::advance) confirms it was
    /// applied, so a failed application can be retried on redelivery.
    pub fn next_ready(&self, tenant_id: TenantId, aggregate_id: AggregateId) -> Option<(u64, T)> {
        let streams = self.streams.read().ok()?;
        let state = streams.get(&(tenant_id, aggregate_id))?;
        let next = state.applied + 1;
        state.pending.get(&next).map(|item| (next, item.clone()))
    }

    pub fn advance(&self, tenant_id: TenantId, aggregate_id: AggregateId, seq: u64) {
        if let Ok(mut streams) = self.streams.write() {
            let state = streams.entry((tenant_id, aggregate_id)).or_default();
            state.applied = state.applied.max(seq);
            let applied = state.applied;
            state.pending.retain(|s, _| *s > applied);
        }
    }

    pub fn clear_tenant(&self, tenant_id: TenantId) {
        if let Ok(mut streams) = self.streams.write() {
            streams.retain(|(t, _), _| *t != tenant_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(cursors: &StreamCursors<&'static str>, t: TenantId, a: AggregateId) -> Vec<&'static str> {
        let mut applied = Vec::new();
        while let Some((seq, item)) = cursors.next_ready(t, a) {
            applied.push(item);
            cursors.advance(t, a, seq);
        }
        applied
    }

    #[test]
    fn duplicates_are_skipped() {
        let cursors = StreamCursors::new();
        let (t, a) = (TenantId::new(), AggregateId::new());

        assert!(cursors.offer(t, a, 1, "first").unwrap());
        assert!(!cursors.offer(t, a, 1, "first again").unwrap());
        assert_eq!(drain(&cursors, t, a), vec!["first"]);

        assert!(!cursors.offer(t, a, 1, "late copy").unwrap());
        assert_eq!(cursors.get(t, a), 1);
        assert!(matches!(
            cursors.offer(t, a, 0, "zero"),
            Err(ProjectionError::NonMonotonicSequence { last: 1, found: 0 })
        ));
    }

    #[test]
    fn gap_is_parked_until_filled() {
        let cursors = StreamCursors::new();
        let (t, a) = (TenantId::new(), AggregateId::new());

        cursors.offer(t, a, 1, "one").unwrap();
        assert_eq!(drain(&cursors, t, a), vec!["one"]);

        cursors.offer(t, a, 3, "three").unwrap();
        assert!(drain(&cursors, t, a).is_empty());
        assert_eq!(cursors.get(t, a), 1);
        assert_eq!(cursors.pending_len(t, a), 1);

        cursors.offer(t, a, 2, "two").unwrap();
        assert_eq!(drain(&cursors, t, a), vec!["two", "three"]);
        assert_eq!(cursors.get(t, a), 3);
        assert_eq!(cursors.pending_len(t, a), 0);
    }

    #[test]
    fn stream_never_starts_past_its_first_event() {
        let cursors = StreamCursors::new();
        let (t, a) = (TenantId::new(), AggregateId::new());

        cursors.offer(t, a, 2, "two").unwrap();
        assert!(drain(&cursors, t, a).is_empty());
        assert_eq!(cursors.get(t, a), 0);

        cursors.offer(t, a, 1, "one").unwrap();
        assert_eq!(drain(&cursors, t, a), vec!["one", "two"]);
    }

    #[test]
    fn clear_tenant_drops_parked_events() {
        let cursors = StreamCursors::new();
        let (t, a) = (TenantId::new(), AggregateId::new());

        cursors.offer(t, a, 5, "five").unwrap();
        cursors.clear_tenant(t);
        assert_eq!(cursors.pending_len(t, a), 0);
        assert_eq!(cursors.get(t, a), 0);
    }
}
