//! Interprets VAD engine output into speech start/end decisions.

use tracing::warn;

use crate::engine::{CacheToken, EngineSet, VadSegment};

/// Boundary outcome of a single VAD call. Offsets are milliseconds relative
/// to the session start; they are diagnostic only — the scheduler always
/// flushes the whole offline queue, never the detected span.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VadBoundary {
    pub start_ms: Option<i64>,
    pub end_ms: Option<i64>,
}

/// Tracks the VAD cache and the speech-active flag for one session.
#[derive(Debug, Default)]
pub struct VadGate {
    cache: CacheToken,
    speech_active: bool,
    /// End offset from the most recent successful VAD call. Sticky across
    /// failed calls, overwritten by every successful one.
    last_end: Option<i64>,
}

impl VadGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single-segment result determines boundaries; zero or multiple
    /// segments mean "no boundary this call" (ambiguous results are not
    /// split).
    pub fn interpret(segments: &[VadSegment]) -> VadBoundary {
        match segments {
            [segment] => VadBoundary {
                start_ms: (segment.start_ms != -1).then_some(segment.start_ms),
                end_ms: (segment.end_ms != -1).then_some(segment.end_ms),
            },
            _ => VadBoundary::default(),
        }
    }

    /// Runs VAD over one incoming frame. On engine failure the previous
    /// gate state is kept untouched and no boundary is reported, so buffered
    /// audio survives a flaky detector.
    pub async fn observe(&mut self, engines: &EngineSet, frame: &[u8]) -> VadBoundary {
        match engines.vad.detect(frame, self.cache.clone()).await {
            Ok((segments, cache)) => {
                self.cache = cache;
                let boundary = Self::interpret(&segments);
                if boundary.start_ms.is_some() {
                    self.speech_active = true;
                }
                if boundary.end_ms.is_some() {
                    self.speech_active = false;
                }
                self.last_end = boundary.end_ms;
                boundary
            }
            Err(error) => {
                warn!(%error, "vad call failed, skipping boundary detection for this frame");
                VadBoundary::default()
            }
        }
    }

    /// True when the most recent VAD result declared a speech end. Drives
    /// the forced-final online pass on the next frame.
    pub fn end_pending(&self) -> bool {
        self.last_end.is_some()
    }

    pub fn speech_active(&self) -> bool {
        self.speech_active
    }

    pub fn deactivate(&mut self) {
        self.speech_active = false;
    }

    pub fn reset_cache(&mut self) {
        self.cache = CacheToken::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_segment_sets_boundaries() {
        let boundary = VadGate::interpret(&[VadSegment {
            start_ms: 1500,
            end_ms: -1,
        }]);
        assert_eq!(boundary.start_ms, Some(1500));
        assert_eq!(boundary.end_ms, None);
    }

    #[test]
    fn zero_or_many_segments_mean_no_boundary() {
        assert_eq!(VadGate::interpret(&[]), VadBoundary::default());
        let many = [
            VadSegment {
                start_ms: 0,
                end_ms: 100,
            },
            VadSegment {
                start_ms: 200,
                end_ms: 300,
            },
        ];
        assert_eq!(VadGate::interpret(&many), VadBoundary::default());
    }

    #[test]
    fn both_offsets_can_arrive_in_one_call() {
        let boundary = VadGate::interpret(&[VadSegment {
            start_ms: 100,
            end_ms: 900,
        }]);
        assert_eq!(boundary.start_ms, Some(100));
        assert_eq!(boundary.end_ms, Some(900));
    }
}
