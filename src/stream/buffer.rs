//! Reorder buffer for streamed chunks
//!
//! Chunks arrive in whatever order the backend finishes synthesizing them.
//! The buffer keys them by sequence index for the one active session and
//! hands them out only when asked for a specific index.

use crate::messages::{Chunk, SessionToken};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Result of offering a chunk to the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// New index stored
    Stored,
    /// An earlier chunk at the same index was replaced (retransmission)
    Replaced,
    /// Token does not belong to the active session; chunk dropped
    Stale,
    /// High-water mark reached; chunk dropped
    Overflow,
    /// Index past the last usable one; chunk dropped
    OutOfRange,
}

impl PutOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, PutOutcome::Stored | PutOutcome::Replaced)
    }
}

#[derive(Debug, Default)]
struct BufferState {
    active: Option<SessionToken>,
    chunks: BTreeMap<u64, Chunk>,
    /// Index the consumer will ask for next; admitted even when full
    expected: Option<u64>,
}

/// Out-of-order chunk store for the active session
#[derive(Debug)]
pub struct ChunkBuffer {
    state: Mutex<BufferState>,
    high_water_mark: Option<usize>,
}

impl ChunkBuffer {
    /// Create an unbounded buffer
    pub fn new() -> Self {
        Self::with_high_water_mark(None)
    }

    /// Create a buffer that holds at most `limit` chunks when `Some`
    pub fn with_high_water_mark(limit: Option<usize>) -> Self {
        Self {
            state: Mutex::new(BufferState::default()),
            high_water_mark: limit,
        }
    }

    /// Make `token` the active session, expecting `first_index` first, and
    /// drop everything buffered
    pub fn reset(&self, token: &SessionToken, first_index: u64) {
        let mut state = self.state.lock();
        if !state.chunks.is_empty() {
            debug!("Discarding {} buffered chunks on reset", state.chunks.len());
        }
        state.chunks.clear();
        state.active = Some(token.clone());
        state.expected = Some(first_index);
    }

    /// Forget the active session; every later `put` is stale
    pub fn invalidate(&self) -> usize {
        let mut state = self.state.lock();
        let dropped = state.chunks.len();
        state.chunks.clear();
        state.active = None;
        state.expected = None;
        dropped
    }

    /// Store `chunk` for the session named by `token`
    pub fn put(&self, token: &SessionToken, chunk: Chunk) -> PutOutcome {
        let mut state = self.state.lock();

        if state.active.as_ref() != Some(token) {
            debug!("Discarding stale chunk {} for session {}", chunk.index, token);
            return PutOutcome::Stale;
        }

        let index = chunk.index;
        if index == u64::MAX {
            warn!("Chunk index {} is out of range, dropping it", index);
            return PutOutcome::OutOfRange;
        }

        if state.chunks.contains_key(&index) {
            debug!("Chunk {} retransmitted, keeping the latest copy", index);
            state.chunks.insert(index, chunk);
            return PutOutcome::Replaced;
        }

        if let Some(limit) = self.high_water_mark {
            if state.chunks.len() >= limit && state.expected != Some(index) {
                warn!(
                    "Chunk buffer at high-water mark ({}), dropping chunk {}",
                    limit, index
                );
                return PutOutcome::Overflow;
            }
        }

        state.chunks.insert(index, chunk);
        PutOutcome::Stored
    }

    /// Remove and return the chunk at `expected_index`, if it has arrived
    pub fn take_next(&self, token: &SessionToken, expected_index: u64) -> Option<Chunk> {
        let mut state = self.state.lock();
        if state.active.as_ref() != Some(token) {
            return None;
        }
        let chunk = state.chunks.remove(&expected_index);
        state.expected = match chunk {
            Some(_) => expected_index.checked_add(1),
            None => Some(expected_index),
        };
        chunk
    }

    /// Number of buffered, not yet consumed chunks
    pub fn pending_count(&self) -> usize {
        self.state.lock().chunks.len()
    }

    /// Smallest buffered index for the session, used to step over gaps
    pub fn lowest_pending_index(&self, token: &SessionToken) -> Option<u64> {
        let state = self.state.lock();
        if state.active.as_ref() != Some(token) {
            return None;
        }
        state.chunks.keys().next().copied()
    }

    pub fn active_token(&self) -> Option<SessionToken> {
        self.state.lock().active.clone()
    }

    pub fn is_active(&self, token: &SessionToken) -> bool {
        self.state.lock().active.as_ref() == Some(token)
    }
}

impl Default for ChunkBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn active_buffer() -> (ChunkBuffer, SessionToken) {
        let buffer = ChunkBuffer::new();
        let token = SessionToken::new();
        buffer.reset(&token, 0);
        (buffer, token)
    }

    #[test]
    fn test_take_next_by_index() {
        let (buffer, token) = active_buffer();
        buffer.put(&token, Chunk::text(2, "c"));
        buffer.put(&token, Chunk::text(0, "a"));

        assert_eq!(buffer.take_next(&token, 0).unwrap().text, "a");
        assert!(buffer.take_next(&token, 1).is_none());
        assert_eq!(buffer.pending_count(), 1);

        buffer.put(&token, Chunk::text(1, "b"));
        assert_eq!(buffer.take_next(&token, 1).unwrap().text, "b");
        assert_eq!(buffer.take_next(&token, 2).unwrap().text, "c");
        assert_eq!(buffer.pending_count(), 0);
    }

    #[test]
    fn test_stale_token_is_discarded() {
        let (buffer, _token) = active_buffer();
        let other = SessionToken::new();

        assert_eq!(buffer.put(&other, Chunk::text(0, "late")), PutOutcome::Stale);
        assert_eq!(buffer.pending_count(), 0);
        assert!(buffer.take_next(&other, 0).is_none());
    }

    #[test]
    fn test_duplicate_last_write_wins() {
        let (buffer, token) = active_buffer();
        assert_eq!(buffer.put(&token, Chunk::text(0, "first")), PutOutcome::Stored);
        assert_eq!(buffer.put(&token, Chunk::text(0, "second")), PutOutcome::Replaced);

        assert_eq!(buffer.pending_count(), 1);
        assert_eq!(buffer.take_next(&token, 0).unwrap().text, "second");
    }

    #[test]
    fn test_high_water_mark() {
        let buffer = ChunkBuffer::with_high_water_mark(Some(2));
        let token = SessionToken::new();
        buffer.reset(&token, 0);

        assert!(buffer.put(&token, Chunk::text(5, "x")).is_accepted());
        assert!(buffer.put(&token, Chunk::text(6, "y")).is_accepted());
        assert_eq!(buffer.put(&token, Chunk::text(7, "z")), PutOutcome::Overflow);
        // Overwriting an existing index is still allowed when full
        assert_eq!(buffer.put(&token, Chunk::text(6, "y2")), PutOutcome::Replaced);
        assert_eq!(buffer.pending_count(), 2);
    }

    #[test]
    fn test_expected_index_admitted_when_full() {
        let buffer = ChunkBuffer::with_high_water_mark(Some(2));
        let token = SessionToken::new();
        buffer.reset(&token, 0);

        buffer.put(&token, Chunk::text(1, "b"));
        buffer.put(&token, Chunk::text(2, "c"));
        assert_eq!(buffer.put(&token, Chunk::text(3, "d")), PutOutcome::Overflow);
        assert_eq!(buffer.put(&token, Chunk::text(0, "a")), PutOutcome::Stored);
        assert_eq!(buffer.pending_count(), 3);

        assert_eq!(buffer.take_next(&token, 0).unwrap().text, "a");
        assert_eq!(buffer.take_next(&token, 1).unwrap().text, "b");
        // Full again after a miss on 3, which keeps 3 admissible
        buffer.put(&token, Chunk::text(5, "f"));
        assert!(buffer.take_next(&token, 3).is_none());
        assert_eq!(buffer.put(&token, Chunk::text(4, "e")), PutOutcome::Overflow);
        assert_eq!(buffer.put(&token, Chunk::text(3, "d")), PutOutcome::Stored);
    }

    #[test]
    fn test_last_index_is_rejected() {
        let (buffer, token) = active_buffer();
        assert_eq!(
            buffer.put(&token, Chunk::text(u64::MAX, "end of the line")),
            PutOutcome::OutOfRange
        );
        assert!(buffer.put(&token, Chunk::text(u64::MAX - 1, "fine")).is_accepted());
        assert_eq!(buffer.pending_count(), 1);
    }

    #[test]
    fn test_invalidate_and_reset() {
        let (buffer, token) = active_buffer();
        buffer.put(&token, Chunk::text(0, "a"));
        buffer.put(&token, Chunk::text(1, "b"));

        assert_eq!(buffer.invalidate(), 2);
        assert!(buffer.active_token().is_none());
        assert_eq!(buffer.put(&token, Chunk::text(2, "c")), PutOutcome::Stale);

        let next = SessionToken::new();
        buffer.reset(&next, 0);
        assert!(buffer.is_active(&next));
        assert!(!buffer.is_active(&token));
    }

    #[test]
    fn test_lowest_pending_index() {
        let (buffer, token) = active_buffer();
        assert!(buffer.lowest_pending_index(&token).is_none());
        buffer.put(&token, Chunk::text(9, "i"));
        buffer.put(&token, Chunk::text(4, "d"));
        assert_eq!(buffer.lowest_pending_index(&token), Some(4));
    }

    #[test]
    fn test_concurrent_put_and_take_loses_nothing() {
        let buffer = Arc::new(ChunkBuffer::new());
        let token = SessionToken::new();
        buffer.reset(&token, 0);

        let producer = {
            let buffer = Arc::clone(&buffer);
            let token = token.clone();
            thread::spawn(move || {
                for i in (0..500u64).rev() {
                    buffer.put(&token, Chunk::text(i, i.to_string()));
                }
            })
        };

        let mut next = 0u64;
        let mut taken = Vec::new();
        while next < 500 {
            if let Some(chunk) = buffer.take_next(&token, next) {
                taken.push(chunk.index);
                next += 1;
            } else {
                thread::yield_now();
            }
        }
        producer.join().unwrap();

        assert_eq!(taken, (0..500).collect::<Vec<_>>());
        assert_eq!(buffer.pending_count(), 0);
    }
}
