//! Rolling audio buffers for one session.

use bytes::Bytes;

/// 16-bit PCM at 16 kHz mono: 32 bytes of audio per millisecond.
pub const BYTES_PER_MS: usize = 32;

/// Frames of look-back history kept after a VAD-end flush.
pub const RETAINED_TAIL_FRAMES: usize = 20;

/// Appends incoming frames to the three per-session buffers and tracks the
/// elapsed-audio counter. Frames are reference-counted, so the triple
/// bookkeeping costs pointers, not copies.
#[derive(Debug, Default)]
pub struct FrameAccumulator {
    /// Rolling history, truncated after flushes; kept for potential re-use,
    /// never reprocessed.
    retained: Vec<Bytes>,
    /// Everything since the last flush; feeds the offline pass.
    offline: Vec<Bytes>,
    /// Frames since the last online trigger.
    online: Vec<Bytes>,
    elapsed_ms: u64,
}

impl FrameAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every frame counts toward all three buffers; offline accumulation is
    /// VAD-independent.
    pub fn push(&mut self, frame: Bytes) {
        self.elapsed_ms += (frame.len() / BYTES_PER_MS) as u64;
        self.retained.push(frame.clone());
        self.offline.push(frame.clone());
        self.online.push(frame);
    }

    pub fn online_len(&self) -> usize {
        self.online.len()
    }

    pub fn offline_is_empty(&self) -> bool {
        self.offline.is_empty()
    }

    pub fn concat_online(&self) -> Vec<u8> {
        concat(&self.online)
    }

    pub fn concat_offline(&self) -> Vec<u8> {
        concat(&self.offline)
    }

    pub fn clear_online(&mut self) {
        self.online.clear();
    }

    pub fn clear_offline(&mut self) {
        self.offline.clear();
    }

    pub fn clear_retained(&mut self) {
        self.retained.clear();
    }

    /// Keeps only the most recent [`RETAINED_TAIL_FRAMES`] frames.
    pub fn truncate_retained(&mut self) {
        if self.retained.len() > RETAINED_TAIL_FRAMES {
            self.retained.drain(..self.retained.len() - RETAINED_TAIL_FRAMES);
        }
    }

    pub fn retained_len(&self) -> usize {
        self.retained.len()
    }

    pub fn offline_len(&self) -> usize {
        self.offline.len()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    pub fn reset_elapsed(&mut self) {
        self.elapsed_ms = 0;
    }
}

fn concat(frames: &[Bytes]) -> Vec<u8> {
    let total: usize = frames.iter().map(Bytes::len).sum();
    let mut joined = Vec::with_capacity(total);
    for frame in frames {
        joined.extend_from_slice(frame);
    }
    joined
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(byte: u8, len: usize) -> Bytes {
        Bytes::from(vec![byte; len])
    }

    #[test]
    fn push_feeds_all_three_buffers() {
        let mut acc = FrameAccumulator::new();
        acc.push(frame(1, 64));
        acc.push(frame(2, 64));
        assert_eq!(acc.online_len(), 2);
        assert_eq!(acc.offline_len(), 2);
        assert_eq!(acc.retained_len(), 2);
        assert_eq!(acc.elapsed_ms(), 4);
    }

    #[test]
    fn concat_preserves_arrival_order() {
        let mut acc = FrameAccumulator::new();
        acc.push(Bytes::from_static(&[1, 2]));
        acc.push(Bytes::from_static(&[3, 4]));
        assert_eq!(acc.concat_offline(), vec![1, 2, 3, 4]);
        assert_eq!(acc.concat_online(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn online_clears_independently_of_offline() {
        let mut acc = FrameAccumulator::new();
        acc.push(frame(1, 32));
        acc.clear_online();
        assert_eq!(acc.online_len(), 0);
        assert!(!acc.offline_is_empty());
    }

    #[test]
    fn truncation_keeps_last_twenty_frames() {
        let mut acc = FrameAccumulator::new();
        for i in 0..30 {
            acc.push(frame(i, 32));
        }
        acc.truncate_retained();
        assert_eq!(acc.retained_len(), RETAINED_TAIL_FRAMES);
        // A shorter history is left alone.
        acc.truncate_retained();
        assert_eq!(acc.retained_len(), RETAINED_TAIL_FRAMES);
    }
}
