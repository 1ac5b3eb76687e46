use image::{Rgb, RgbImage};
use space_hawks::camera::{DirectorySource, FrameSource};
use space_hawks::persist::{save_report, FRAME_STATS_FILE};
use space_hawks::scoring::{BlueIntensity, Clarity};
use space_hawks::{CaptureError, CaptureSession, SelectError, SessionLimits};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::tempdir;

/// Scripted source: `Some(blue)` yields a 2x2 frame with that blue value,
/// `None` a failed read.
struct Scripted(VecDeque<Option<u8>>);

impl Scripted {
    fn new(frames: &[Option<u8>]) -> Self {
        Self(frames.iter().copied().collect())
    }
}

impl FrameSource for Scripted {
    fn next_frame(&mut self) -> Result<RgbImage, CaptureError> {
        match self.0.pop_front() {
            Some(Some(b)) => Ok(RgbImage::from_pixel(2, 2, Rgb([0, 0, b]))),
            Some(None) => Err(CaptureError::FrameUnavailable("scripted".into())),
            None => Err(CaptureError::Exhausted),
        }
    }
}

fn long() -> SessionLimits {
    SessionLimits {
        duration: Duration::from_secs(60),
        max_frames: None,
    }
}

fn kept_blues(report: &space_hawks::SessionReport, label: &str) -> Vec<u8> {
    let mut v: Vec<u8> = report.selections[label]
        .iter()
        .flatten()
        .map(|c| c.payload.image.get_pixel(0, 0)[2])
        .collect();
    v.sort();
    v
}

#[test]
fn zero_capacity_fails_before_reading() {
    let err = CaptureSession::new(Scripted::new(&[Some(1)]), BlueIntensity, 0)
        .err()
        .unwrap();
    assert_eq!(err, SelectError::InvalidCapacity(0));
}

#[test]
fn keeps_bluest_frames_and_skips_failed_reads() {
    let source = Scripted::new(&[
        Some(3),
        None,
        Some(1),
        Some(4),
        Some(1),
        None,
        Some(5),
        Some(9),
        Some(2),
        Some(6),
    ]);
    let mut session = CaptureSession::new(source, BlueIntensity, 5).unwrap();
    let stats = session.run(long());
    assert_eq!(stats.observed, 8);
    assert_eq!(stats.unavailable, 2);

    let report = session.finish();
    assert_eq!(kept_blues(&report, "blue_frame"), vec![3, 4, 5, 6, 9]);
}

#[test]
fn frame_limit_ends_session() {
    let source = Scripted::new(&[Some(1), Some(2), Some(3), Some(4)]);
    let mut session = CaptureSession::new(source, BlueIntensity, 5).unwrap();
    let stats = session.run(SessionLimits {
        duration: Duration::from_secs(60),
        max_frames: Some(2),
    });
    assert_eq!(stats.observed, 2);
    let report = session.finish();
    let slots = &report.selections["blue_frame"];
    assert_eq!(slots.iter().filter(|s| s.is_none()).count(), 3);
}

#[test]
fn raised_stop_flag_ends_session_immediately() {
    let mut session =
        CaptureSession::new(Scripted::new(&[Some(1), Some(2)]), BlueIntensity, 2).unwrap();
    session.stop_handle().store(true, Ordering::SeqCst);
    let stats = session.run(long());
    assert_eq!(stats.observed, 0);
    assert!(session.finish().selections.is_empty());
}

#[test]
fn zero_duration_reads_nothing() {
    let mut session = CaptureSession::new(Scripted::new(&[Some(1)]), BlueIntensity, 2).unwrap();
    let stats = session.run(SessionLimits {
        duration: Duration::ZERO,
        max_frames: None,
    });
    assert_eq!(stats.observed, 0);
}

#[test]
fn clarity_splits_day_and_night() {
    struct Mixed(Vec<RgbImage>);
    impl FrameSource for Mixed {
        fn next_frame(&mut self) -> Result<RgbImage, CaptureError> {
            self.0.pop().ok_or(CaptureError::Exhausted)
        }
    }
    let frames = vec![
        RgbImage::from_pixel(2, 2, Rgb([60, 100, 120])),
        RgbImage::from_pixel(2, 2, Rgb([5, 5, 5])),
        RgbImage::new(0, 0),
    ];
    let mut session = CaptureSession::new(Mixed(frames), Clarity, 3).unwrap();
    let stats = session.run(long());
    assert_eq!(stats.observed, 3);
    assert_eq!(stats.rejected_scores, 1);

    let report = session.finish();
    assert_eq!(report.selections.len(), 2);
    assert_eq!(report.selections["day_image"].iter().flatten().count(), 1);
    assert_eq!(report.selections["night_image"].iter().flatten().count(), 1);
}

#[test]
fn report_is_saved_with_slot_numbered_names() {
    let source = Scripted::new(&[Some(10), Some(200), Some(30)]);
    let mut session = CaptureSession::new(source, BlueIntensity, 5).unwrap();
    session.run(long());
    let report = session.finish();

    let dir = tempdir().unwrap();
    let out = dir.path().join("frames");
    let written = save_report(&out, &report).unwrap();
    assert_eq!(
        written,
        vec![
            out.join("blue_frame_1.jpg"),
            out.join("blue_frame_2.jpg"),
            out.join("blue_frame_3.jpg"),
        ]
    );
    for path in written {
        let img = image::open(&path).unwrap();
        assert_eq!((img.width(), img.height()), (2, 2));
    }
    assert!(!out.join("blue_frame_4.jpg").exists());
}

#[test]
fn directory_source_replays_files_once() {
    let dir = tempdir().unwrap();
    RgbImage::from_pixel(2, 2, Rgb([0, 0, 40]))
        .save(dir.path().join("a.png"))
        .unwrap();
    std::fs::write(dir.path().join("b.png"), b"not an image").unwrap();
    RgbImage::from_pixel(2, 2, Rgb([0, 0, 80]))
        .save(dir.path().join("c.png"))
        .unwrap();

    let mut source = DirectorySource::new(dir.path()).unwrap();
    assert_eq!(source.len(), 3);
    assert_eq!(source.next_frame().unwrap().get_pixel(0, 0)[2], 40);
    assert!(matches!(
        source.next_frame(),
        Err(CaptureError::FrameUnavailable(_))
    ));
    assert_eq!(source.next_frame().unwrap().get_pixel(0, 0)[2], 80);
    assert!(matches!(source.next_frame(), Err(CaptureError::Exhausted)));
}

#[test]
fn directory_source_requires_directory() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("missing");
    assert!(matches!(
        DirectorySource::new(&missing),
        Err(CaptureError::Open(_))
    ));
}

/// Scripted source that raises a flag when dropped.
struct Tracked {
    inner: Scripted,
    released: Arc<AtomicBool>,
}

impl Tracked {
    fn new(frames: &[Option<u8>]) -> (Self, Arc<AtomicBool>) {
        let released = Arc::new(AtomicBool::new(false));
        let source = Self {
            inner: Scripted::new(frames),
            released: released.clone(),
        };
        (source, released)
    }
}

impl FrameSource for Tracked {
    fn next_frame(&mut self) -> Result<RgbImage, CaptureError> {
        self.inner.next_frame()
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

#[test]
fn source_released_after_exhaustion() {
    let (source, released) = Tracked::new(&[Some(1), None, Some(2)]);
    let mut session = CaptureSession::new(source, BlueIntensity, 2).unwrap();
    session.run(long());
    assert!(!released.load(Ordering::SeqCst));
    let report = session.finish();
    assert!(released.load(Ordering::SeqCst));
    assert_eq!(kept_blues(&report, "blue_frame"), vec![1, 2]);
}

#[test]
fn source_released_after_early_stop() {
    let (source, released) = Tracked::new(&[Some(1), Some(2), Some(3)]);
    let mut session = CaptureSession::new(source, BlueIntensity, 2).unwrap();
    session.stop_handle().store(true, Ordering::SeqCst);
    session.run(long());
    session.finish();
    assert!(released.load(Ordering::SeqCst));
}

#[test]
fn source_released_when_session_dropped_unfinished() {
    let (source, released) = Tracked::new(&[Some(1)]);
    let mut session = CaptureSession::new(source, BlueIntensity, 2).unwrap();
    session.run(SessionLimits {
        duration: Duration::from_secs(60),
        max_frames: Some(1),
    });
    drop(session);
    assert!(released.load(Ordering::SeqCst));
}

#[test]
fn retained_frames_keep_capture_time() {
    let before = chrono::Utc::now();
    let mut session =
        CaptureSession::new(Scripted::new(&[Some(7), Some(9)]), BlueIntensity, 2).unwrap();
    session.run(long());
    let after = chrono::Utc::now();
    let report = session.finish();
    let kept: Vec<_> = report.selections["blue_frame"].iter().flatten().collect();
    assert_eq!(kept.len(), 2);
    for c in &kept {
        assert!(c.payload.captured_at >= before && c.payload.captured_at <= after);
    }
    assert!(kept[0].payload.captured_at <= kept[1].payload.captured_at);
}

#[test]
fn frame_stats_are_recorded_and_saved() {
    let source = Scripted::new(&[Some(120), None, Some(5)]);
    let mut session = CaptureSession::new(source, BlueIntensity, 1)
        .unwrap()
        .with_frame_stats(true);
    session.run(long());
    let report = session.finish();
    assert_eq!(report.frame_stats.len(), 2);
    assert_eq!(report.frame_stats[0].frame, 0);
    assert_eq!(report.frame_stats[1].frame, 1);
    assert_eq!(report.frame_stats[1].score, 20.0);
    // blue 5 with red and green at 0 counts as black
    assert!((report.frame_stats[1].shares.black - 100.0).abs() < 1e-9);

    let dir = tempdir().unwrap();
    let written = save_report(dir.path(), &report).unwrap();
    let log = dir.path().join(FRAME_STATS_FILE);
    assert!(written.contains(&log));

    let text = std::fs::read_to_string(&log).unwrap();
    let lines: Vec<serde_json::Value> = text
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["frame"], 0);
    assert_eq!(lines[0]["label"], "blue_frame");
    assert_eq!(lines[0]["score"], 480.0);
    assert!(lines[0]["captured_at"].is_string());
    for key in ["blue", "green", "brown", "black", "yellow"] {
        assert!(lines[1][key].is_number(), "missing {key}");
    }
}

#[test]
fn frame_stats_are_off_by_default() {
    let mut session = CaptureSession::new(Scripted::new(&[Some(1)]), BlueIntensity, 1).unwrap();
    session.run(long());
    let report = session.finish();
    assert!(report.frame_stats.is_empty());

    let dir = tempdir().unwrap();
    save_report(dir.path(), &report).unwrap();
    assert!(!dir.path().join(FRAME_STATS_FILE).exists());
}

/// Source that never delivers a frame.
struct Unplugged;

impl FrameSource for Unplugged {
    fn next_frame(&mut self) -> Result<RgbImage, CaptureError> {
        Err(CaptureError::FrameUnavailable("device gone".into()))
    }
}

#[test]
fn failing_source_is_polled_with_backoff() {
    let mut session = CaptureSession::new(Unplugged, BlueIntensity, 1).unwrap();
    let started = Instant::now();
    let stats = session.run(SessionLimits {
        duration: Duration::from_millis(100),
        max_frames: None,
    });
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert_eq!(stats.observed, 0);
    assert!(stats.unavailable >= 1);
    // each repeated failure waits at least 10ms
    assert!(stats.unavailable <= 12, "spun {} times", stats.unavailable);
}
