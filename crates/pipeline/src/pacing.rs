//! Outbound pacing queue
//!
//! AI audio arrives in bursts; the telephony leg plays one 20 ms frame per
//! 20 ms. Producers push whole frames, the call loop calls [`PacingQueue::tick`]
//! once per frame period and at most one frame leaves per tick. Nothing is
//! dropped and nothing is synthesized: a slow writer grows the queue, an
//! empty queue makes the tick a no-op.

use bytes::Bytes;
use std::collections::VecDeque;

/// What a tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// One frame handed to the writer
    Sent,
    /// Nothing queued
    Empty,
    /// Session id unknown or writer gone; frame kept
    NotReady,
    /// Writer full; frame kept at the head for the next tick
    WouldBlock,
}

/// FIFO of fixed-size frames for one call
#[derive(Debug)]
pub struct PacingQueue {
    frames: VecDeque<Bytes>,
    frame_size: usize,
    enqueued: u64,
    sent: u64,
    rejected: u64,
}

impl PacingQueue {
    pub fn new(frame_size: usize) -> Self {
        Self {
            frames: VecDeque::new(),
            frame_size,
            enqueued: 0,
            sent: 0,
            rejected: 0,
        }
    }

    /// Append one frame. Frames of the wrong size are refused.
    pub fn push(&mut self, frame: Bytes) -> bool {
        if frame.len() != self.frame_size {
            self.rejected += 1;
            tracing::debug!(
                len = frame.len(),
                expected = self.frame_size,
                "Refusing short or oversized outbound frame"
            );
            return false;
        }
        self.frames.push_back(frame);
        self.enqueued += 1;
        true
    }

    /// Append frames in order, returning how many were accepted
    pub fn extend<I: IntoIterator<Item = Bytes>>(&mut self, frames: I) -> usize {
        frames.into_iter().map(|f| self.push(f)).filter(|ok| *ok).count()
    }

    /// Dequeue at most one frame and hand it to `send`.
    ///
    /// `send` must not block. It returns the frame back when the writer
    /// cannot take it right now.
    pub fn tick<F>(&mut self, ready: bool, send: F) -> TickOutcome
    where
        F: FnOnce(Bytes) -> Result<(), Bytes>,
    {
        if !ready {
            return if self.frames.is_empty() {
                TickOutcome::Empty
            } else {
                TickOutcome::NotReady
            };
        }
        let Some(frame) = self.frames.pop_front() else {
            return TickOutcome::Empty;
        };
        match send(frame) {
            Ok(()) => {
                self.sent += 1;
                TickOutcome::Sent
            },
            Err(frame) => {
                self.frames.push_front(frame);
                TickOutcome::WouldBlock
            },
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Discard everything queued, returning how many frames were dropped
    pub fn clear(&mut self) -> usize {
        let discarded = self.frames.len();
        self.frames.clear();
        discarded
    }

    pub fn enqueued(&self) -> u64 {
        self.enqueued
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn frame(tag: u8) -> Bytes {
        Bytes::from(vec![tag; 160])
    }

    #[test]
    fn test_one_frame_per_tick_in_order() {
        let mut queue = PacingQueue::new(160);
        assert_eq!(queue.extend((0..5).map(frame)), 5);

        let mut out = Vec::new();
        for _ in 0..7 {
            queue.tick(true, |f| {
                out.push(f[0]);
                Ok(())
            });
        }
        assert_eq!(out, vec![0, 1, 2, 3, 4]);
        assert_eq!(queue.sent(), 5);
        assert_eq!(queue.tick(true, |_| Ok(())), TickOutcome::Empty);
    }

    #[test]
    fn test_not_ready_keeps_frames() {
        let mut queue = PacingQueue::new(160);
        queue.push(frame(1));
        assert_eq!(queue.tick(false, |_| Ok(())), TickOutcome::NotReady);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_would_block_keeps_head() {
        let mut queue = PacingQueue::new(160);
        queue.push(frame(1));
        queue.push(frame(2));

        assert_eq!(queue.tick(true, Err), TickOutcome::WouldBlock);
        let mut first = None;
        queue.tick(true, |f| {
            first = Some(f[0]);
            Ok(())
        });
        assert_eq!(first, Some(1));
    }

    #[test]
    fn test_rejects_wrong_size_and_clears() {
        let mut queue = PacingQueue::new(160);
        assert!(!queue.push(Bytes::from_static(&[0u8; 10])));
        assert_eq!(queue.rejected(), 1);
        queue.push(frame(1));
        queue.push(frame(2));
        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_drain_rate() {
        let mut queue = PacingQueue::new(160);
        queue.extend((0..50).map(frame));

        let mut ticker = tokio::time::interval(Duration::from_millis(20));
        let start = tokio::time::Instant::now();
        let mut sent = 0;
        while sent < 50 {
            ticker.tick().await;
            if queue.tick(true, |_| Ok(())) == TickOutcome::Sent {
                sent += 1;
            }
        }
        // First tick fires immediately, the remaining 49 are 20 ms apart
        assert_eq!(start.elapsed(), Duration::from_millis(49 * 20));
    }
}
