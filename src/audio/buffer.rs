use parking_lot::Mutex;
use ringbuf::{traits::*, HeapRb};
use std::sync::Arc;

/// Thread-safe sample queue between a clip feeder and the device callback
///
/// Unlike a capture ring, a playback ring never overwrites: `push` accepts
/// only what fits and the feeder retries with the rest.
pub struct PlaybackRing {
    buffer: Arc<Mutex<HeapRb<f32>>>,
}

impl PlaybackRing {
    /// Create a new ring with the specified capacity in samples
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(HeapRb::new(capacity.max(1)))),
        }
    }

    /// Queue as many samples as fit, returns how many were taken
    pub fn push(&self, samples: &[f32]) -> usize {
        self.buffer.lock().push_slice(samples)
    }

    /// Fill `out` from the front of the ring, returns how many were written
    pub fn pop_into(&self, out: &mut [f32]) -> usize {
        self.buffer.lock().pop_slice(out)
    }

    /// Number of queued samples
    pub fn len(&self) -> usize {
        self.buffer.lock().occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }

    /// Free space in samples
    pub fn vacant(&self) -> usize {
        self.buffer.lock().vacant_len()
    }

    /// Drop everything queued
    pub fn clear(&self) {
        self.buffer.lock().clear();
    }

    pub fn capacity(&self) -> usize {
        self.buffer.lock().capacity().get()
    }
}

impl Clone for PlaybackRing {
    fn clone(&self) -> Self {
        Self {
            buffer: Arc::clone(&self.buffer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_in_order() {
        let ring = PlaybackRing::new(1024);
        let data: Vec<f32> = (0..100).map(|i| i as f32).collect();

        assert_eq!(ring.push(&data), 100);
        assert_eq!(ring.len(), 100);

        let mut out = vec![0.0; 100];
        assert_eq!(ring.pop_into(&mut out), 100);
        assert_eq!(out, data);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_push_never_overwrites() {
        let ring = PlaybackRing::new(10);
        let data: Vec<f32> = (0..20).map(|i| i as f32).collect();

        assert_eq!(ring.push(&data), 10);
        assert_eq!(ring.vacant(), 0);

        let mut out = vec![0.0; 20];
        assert_eq!(ring.pop_into(&mut out), 10);
        assert_eq!(out[0], 0.0);
        assert_eq!(out[9], 9.0);
    }

    #[test]
    fn test_clear_and_shared_clone() {
        let ring = PlaybackRing::new(16);
        let feeder = ring.clone();
        feeder.push(&[1.0; 8]);
        assert_eq!(ring.len(), 8);

        ring.clear();
        assert!(feeder.is_empty());
        assert_eq!(ring.capacity(), 16);
    }
}
