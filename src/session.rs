//! Timed capture session.
//!
//! A session owns its frame source and one [`TopK`] per score label. Each
//! observed frame is scored and offered to the set matching its label.
//! Finishing the session drops the source, which releases the camera.

use crate::camera::FrameSource;
use crate::error::{CaptureError, SelectError};
use crate::scoring::{ColourShares, Scorer};
use crate::topk::{Candidate, TopK};
use chrono::{DateTime, Utc};
use image::RgbImage;
use serde::Serialize;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// When a session stops observing frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionLimits {
    pub duration: Duration,
    pub max_frames: Option<usize>,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            duration: Duration::from_secs(30),
            max_frames: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub observed: usize,
    pub unavailable: usize,
    pub rejected_scores: usize,
}

/// Pause between reads while the source keeps failing.
const UNAVAILABLE_BACKOFF: Duration = Duration::from_millis(10);

/// A retained frame and the moment it was read from the source.
#[derive(Clone, Debug, PartialEq)]
pub struct CapturedFrame {
    pub image: RgbImage,
    pub captured_at: DateTime<Utc>,
}

/// Colour statistics of one observed frame, written as a JSON line.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FrameStats {
    pub frame: usize,
    pub captured_at: DateTime<Utc>,
    pub label: &'static str,
    pub score: f64,
    #[serde(flatten)]
    pub shares: ColourShares,
}

/// Finalized contents of a session, keyed by score label.
#[derive(Debug)]
pub struct SessionReport {
    pub selections: BTreeMap<&'static str, Vec<Option<Candidate<CapturedFrame>>>>,
    /// Per-frame records, empty unless enabled with [`CaptureSession::with_frame_stats`].
    pub frame_stats: Vec<FrameStats>,
    pub stats: SessionStats,
}

pub struct CaptureSession<S, C> {
    source: S,
    scorer: C,
    capacity: usize,
    selectors: BTreeMap<&'static str, TopK<CapturedFrame>>,
    stop: Arc<AtomicBool>,
    stats: SessionStats,
    frame_stats: Option<Vec<FrameStats>>,
}

impl<S: FrameSource, C: Scorer> CaptureSession<S, C> {
    pub fn new(source: S, scorer: C, capacity: usize) -> Result<Self, SelectError> {
        // fail on a zero capacity before any frame is read
        TopK::<CapturedFrame>::new(capacity)?;
        Ok(Self {
            source,
            scorer,
            capacity,
            selectors: BTreeMap::new(),
            stop: Arc::new(AtomicBool::new(false)),
            stats: SessionStats::default(),
            frame_stats: None,
        })
    }

    /// Records colour statistics for every observed frame.
    pub fn with_frame_stats(mut self, enabled: bool) -> Self {
        self.frame_stats = enabled.then(Vec::new);
        self
    }

    /// Flag that ends [`run`](Self::run) early once set.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Scores one frame captured now and offers it to the selector for its label.
    pub fn observe(&mut self, frame: RgbImage) -> Result<bool, SelectError> {
        self.observe_at(frame, Utc::now())
    }

    pub fn observe_at(
        &mut self,
        image: RgbImage,
        captured_at: DateTime<Utc>,
    ) -> Result<bool, SelectError> {
        let frame_id = self.stats.observed;
        self.stats.observed += 1;
        let score = self.scorer.score(&image);
        if let Some(records) = self.frame_stats.as_mut() {
            records.push(FrameStats {
                frame: frame_id,
                captured_at,
                label: score.label,
                score: score.value,
                shares: ColourShares::measure(&image),
            });
        }
        if !score.value.is_finite() {
            self.stats.rejected_scores += 1;
            return Err(SelectError::InvalidScore(score.value));
        }
        let selector = match self.selectors.entry(score.label) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => e.insert(TopK::new(self.capacity)?),
        };
        let frame = CapturedFrame { image, captured_at };
        let offer = selector.offer(Candidate::new(frame, score.value))?;
        trace!(frame = frame_id, label = score.label, score = score.value, ?offer, "frame offered");
        Ok(offer.is_accepted())
    }

    /// Reads frames until the duration elapses, `max_frames` is reached,
    /// the source runs dry, or the stop flag is raised.
    pub fn run(&mut self, limits: SessionLimits) -> SessionStats {
        let start = Instant::now();
        let mut failing = 0usize;
        info!(duration = ?limits.duration, capacity = self.capacity, "capture session started");
        loop {
            if start.elapsed() >= limits.duration {
                debug!("session duration elapsed");
                break;
            }
            if self.stop.load(Ordering::Relaxed) {
                info!("session stopped early");
                break;
            }
            if limits.max_frames.is_some_and(|max| self.stats.observed >= max) {
                debug!(frames = self.stats.observed, "frame limit reached");
                break;
            }
            let frame = match self.source.next_frame() {
                Ok(f) => f,
                Err(CaptureError::FrameUnavailable(reason)) => {
                    self.stats.unavailable += 1;
                    if failing == 0 {
                        warn!("skipping frame: {reason}");
                    } else {
                        debug!(failing, "skipping frame: {reason}");
                        std::thread::sleep(UNAVAILABLE_BACKOFF);
                    }
                    failing += 1;
                    continue;
                }
                Err(CaptureError::Exhausted) => {
                    debug!("frame source exhausted");
                    break;
                }
                Err(e) => {
                    warn!("frame source failed: {e}");
                    break;
                }
            };
            if failing > 1 {
                info!(failed = failing, "frame source recovered");
            }
            failing = 0;
            if let Err(e) = self.observe(frame) {
                warn!("frame not scored: {e}");
            }
        }
        info!(
            observed = self.stats.observed,
            unavailable = self.stats.unavailable,
            elapsed = ?start.elapsed(),
            "capture session finished"
        );
        self.stats
    }

    /// Ends the session, releasing the source and returning the selections.
    pub fn finish(self) -> SessionReport {
        let Self {
            source,
            selectors,
            stats,
            frame_stats,
            ..
        } = self;
        drop(source);
        SessionReport {
            selections: selectors
                .into_iter()
                .map(|(label, top)| (label, top.into_slots()))
                .collect(),
            frame_stats: frame_stats.unwrap_or_default(),
            stats,
        }
    }
}
