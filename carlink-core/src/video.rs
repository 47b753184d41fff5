//! Latest-wins buffering between the USB reader and the downstream
//! transcoder.
//!
//! A momentary consumer stall must never become a growing queue: the
//! insert discipline drains everything already queued before pushing
//! the new frame, so the consumer always sees the most recent access
//! unit and end-to-end latency stays bounded. Frame completeness is
//! explicitly sacrificed.
//!
//! Frames are owned byte vectors. The USB receive buffer is reused by
//! the next transfer, so payloads are copied off it at decode time and
//! never referenced from here.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Notify;

/// Queue depth. With latest-wins draining the queue almost never holds
/// more than one frame; the extra slots only absorb a consumer that is
/// mid-pop during a push.
const DEFAULT_CAPACITY: usize = 3;

// ── VideoFrame ───────────────────────────────────────────────────

/// One H.264 access unit, detached from its transport buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    pub width: i32,
    pub height: i32,
    /// Raw Annex-B bitstream bytes (SPS/PPS prefixes on keyframes).
    pub data: Vec<u8>,
}

// ── FrameBuffer ──────────────────────────────────────────────────

struct Inner {
    frames: VecDeque<VideoFrame>,
    closed: bool,
}

/// Single-producer single-consumer latest-wins frame slot.
pub struct FrameBuffer {
    inner: Mutex<Inner>,
    notify: Notify,
    capacity: usize,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                frames: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            notify: Notify::new(),
            capacity,
        }
    }

    /// Insert a frame, discarding everything older.
    ///
    /// Returns the number of stale frames that were dropped. Pushing
    /// into a closed buffer is a no-op.
    pub fn push(&self, frame: VideoFrame) -> usize {
        let dropped = {
            let mut inner = self.inner.lock().unwrap();
            if inner.closed {
                return 0;
            }
            let dropped = inner.frames.len();
            inner.frames.clear();
            if inner.frames.len() < self.capacity {
                inner.frames.push_back(frame);
            }
            dropped
        };
        self.notify.notify_one();
        dropped
    }

    /// Take the most recent frame, waiting if none is queued.
    ///
    /// Returns `None` once the buffer is closed and drained.
    pub async fn recv(&self) -> Option<VideoFrame> {
        loop {
            // Register interest before checking, so a push between the
            // check and the await is not lost.
            let notified = self.notify.notified();
            {
                let mut inner = self.inner.lock().unwrap();
                if let Some(frame) = inner.frames.pop_front() {
                    return Some(frame);
                }
                if inner.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Non-blocking take.
    pub fn try_recv(&self) -> Option<VideoFrame> {
        self.inner.lock().unwrap().frames.pop_front()
    }

    /// Frames currently queued (0 or 1 in steady state).
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop any pending frames. Used on detach.
    pub fn clear(&self) {
        self.inner.lock().unwrap().frames.clear();
    }

    /// Close the buffer: pending frames stay readable, then `recv`
    /// returns `None`. Idempotent.
    pub fn close(&self) {
        self.inner.lock().unwrap().closed = true;
        self.notify.notify_waiters();
        self.notify.notify_one();
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn frame(tag: u8) -> VideoFrame {
        VideoFrame {
            width: 800,
            height: 480,
            data: vec![tag; 16],
        }
    }

    #[test]
    fn latest_wins() {
        let buffer = FrameBuffer::new();
        for tag in 1..=5u8 {
            buffer.push(frame(tag));
        }
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.try_recv().unwrap().data[0], 5);
        assert_eq!(buffer.len(), 0);
        assert!(buffer.try_recv().is_none());
    }

    #[test]
    fn push_reports_drops() {
        let buffer = FrameBuffer::new();
        assert_eq!(buffer.push(frame(1)), 0);
        assert_eq!(buffer.push(frame(2)), 1);
        buffer.try_recv();
        assert_eq!(buffer.push(frame(3)), 0);
    }

    #[test]
    fn frames_are_owned() {
        let buffer = FrameBuffer::new();
        let mut source = vec![0xDEu8; 32];
        buffer.push(VideoFrame {
            width: 0,
            height: 0,
            data: source.clone(),
        });

        // Reusing the "transfer buffer" must not affect the queued frame.
        source.fill(0x00);
        assert_eq!(buffer.try_recv().unwrap().data[0], 0xDE);
    }

    #[tokio::test]
    async fn recv_wakes_on_push() {
        let buffer = Arc::new(FrameBuffer::new());
        let consumer = {
            let buffer = buffer.clone();
            tokio::spawn(async move { buffer.recv().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        buffer.push(frame(9));

        let received = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.unwrap().data[0], 9);
    }

    #[tokio::test]
    async fn close_releases_waiting_consumer() {
        let buffer = Arc::new(FrameBuffer::new());
        let consumer = {
            let buffer = buffer.clone();
            tokio::spawn(async move { buffer.recv().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        buffer.close();

        let received = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert!(received.is_none());
    }

    #[test]
    fn clear_on_detach() {
        let buffer = FrameBuffer::new();
        buffer.push(frame(1));
        buffer.clear();
        assert!(buffer.is_empty());
        // Still usable after a clear.
        buffer.push(frame(2));
        assert_eq!(buffer.try_recv().unwrap().data[0], 2);
    }

    #[test]
    fn push_after_close_is_dropped() {
        let buffer = FrameBuffer::new();
        buffer.close();
        buffer.push(frame(1));
        assert!(buffer.is_empty());
    }
}
