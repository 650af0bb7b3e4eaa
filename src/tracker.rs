//! The frame-by-frame tracking loop.
//!
//! For each frame: convert to gray, crop, update arena detection while the
//! arenas are not locked, skip the frame if fewer than the target number of
//! arenas validate, otherwise find and validate one fly per arena and emit
//! one [`PositionRecord`] per fly found. A bad frame or a missing fly never
//! ends the loop; only the end of the stream or a stop request does.

use crate::arena::{assign_identity, Arena, ArenaDetector, ArenaDetectorSettings};
use crate::cancel::CancelToken;
use crate::error::{LearnMemError, Result};
use crate::fly::{find_flies, pick_fly, Fly, FlyCriteria};
use crate::frame_source::{Frame, FrameSource};
use crate::image_ops::{self, Gray, Polarity, Roi};
use crate::pin_state::PinState;
use crate::result_writer::{PositionRecord, ResultRow, SharedSink};
use crate::status::{Runnable, SettingsBridge, Status, StatusCell};

use log::{error, info, warn};
use ndarray::s;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Instant,
};

/// Tunables of the [`Tracker`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerSettings {
    /// Number of arenas expected in every frame.
    pub targets: usize,
    /// Number of arena columns.
    pub columns: usize,
    /// Frames during which arena detection always runs.
    pub warmup_frames: u64,
    /// Lock the arenas once the warm-up is over and a frame met the target.
    pub auto_lock: bool,
    pub roi: Option<Roi>,
    pub detector: ArenaDetectorSettings,
    /// Side of the adaptive threshold block, in pixels.
    pub adaptive_block: usize,
    pub adaptive_offset: f64,
    /// Whether flies are darker or brighter than the arena floor.
    pub fly_polarity: Polarity,
    pub fly: FlyCriteria,
    /// Failed reads in a row before the stream counts as ended.
    pub read_retries: u32,
    /// Where crops of arenas without a fly are saved, if anywhere.
    pub failed_arena_dir: Option<PathBuf>,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            targets: 6,
            columns: 3,
            warmup_frames: 10,
            auto_lock: true,
            roi: None,
            detector: ArenaDetectorSettings::default(),
            adaptive_block: 31,
            adaptive_offset: 20.0,
            fly_polarity: Polarity::Dark,
            fly: FlyCriteria::default(),
            read_retries: 10,
            failed_arena_dir: None,
        }
    }
}

/// Counters of a tracking run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrackerStats {
    /// Frames read, tracked or not.
    pub frame_count: u64,
    pub tracked_frames: u64,
    /// Frames with fewer valid arenas than the target.
    pub skipped_frames: u64,
    /// Arena-frames without a valid fly.
    pub missing_fly: u64,
    pub missing_per_arena: BTreeMap<usize, u64>,
    /// Flies found in the last tracked frame.
    pub found_flies: usize,
    pub relaxation_factor: f64,
    pub arenas_locked: bool,
    pub last_timestamp: f64,
}

/// What happened to one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Arenas met the target and flies were looked for.
    Tracked { frame_index: u64, found: usize },
    /// Fewer valid arenas than the target. The frame was skipped.
    Shortfall { frame_index: u64, arenas: usize },
    /// The frame source has no more frames.
    EndOfStream,
}

/// A handle to stop a tracker running on another thread and to watch its
/// counters.
#[derive(Debug, Clone)]
pub struct TrackerHandle {
    halt: CancelToken,
    stats: Arc<Mutex<TrackerStats>>,
}

impl TrackerHandle {
    /// Ask the loop to end after the frame it is working on.
    pub fn stop(&self) {
        self.halt.cancel();
    }

    pub fn stats(&self) -> TrackerStats {
        self.stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

pub struct Tracker {
    source: Box<dyn FrameSource>,
    settings: TrackerSettings,
    detector: ArenaDetector,
    sink: Option<SharedSink>,
    pins: Option<PinState>,
    halt: CancelToken,
    status: StatusCell,
    stats: Arc<Mutex<TrackerStats>>,
    frame_count: u64,
    locked: bool,
    arenas: Vec<Arena>,
    last_frame: Option<Gray>,
    previous_found: Option<usize>,
    finished: bool,
}

impl Tracker {
    /// A tracker reading from `source`, stopped by `cancel` or by its own
    /// [`Tracker::stop`](Runnable::stop).
    pub fn new(source: Box<dyn FrameSource>, settings: TrackerSettings, cancel: &CancelToken) -> Self {
        let detector = ArenaDetector::new(settings.detector.clone());
        Self {
            source,
            settings,
            detector,
            sink: None,
            pins: None,
            halt: cancel.child(),
            status: StatusCell::new(),
            stats: Arc::new(Mutex::new(TrackerStats {
                relaxation_factor: 1.0,
                ..Default::default()
            })),
            frame_count: 0,
            locked: false,
            arenas: Vec::new(),
            last_frame: None,
            previous_found: None,
            finished: false,
        }
    }

    /// Send position records to `sink`.
    pub fn sink(mut self, sink: SharedSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Annotate records with this pin state.
    pub fn pin_state(mut self, pins: PinState) -> Self {
        self.pins = Some(pins);
        self
    }

    pub fn handle(&self) -> TrackerHandle {
        TrackerHandle {
            halt: self.halt.clone(),
            stats: self.stats.clone(),
        }
    }

    pub fn settings(&self) -> &TrackerSettings {
        &self.settings
    }

    pub fn stats(&self) -> TrackerStats {
        self.stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn update_stats(&self, update: impl FnOnce(&mut TrackerStats)) {
        let mut stats = self
            .stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        update(&mut stats);
        stats.frame_count = self.frame_count;
        stats.relaxation_factor = self.detector.relaxation_factor();
        stats.arenas_locked = self.locked;
    }

    /// The last processed frame, grayscale and cropped.
    pub fn last_frame(&self) -> Option<&Gray> {
        self.last_frame.as_ref()
    }

    /// The arenas of the last tracked frame, in identity order.
    pub fn last_arenas(&self) -> &[Arena] {
        &self.arenas
    }

    /// Freeze arena detection: the current arenas are used from now on.
    pub fn lock_arenas(&mut self) {
        if !self.locked {
            info!("Tracker : arenas locked");
            self.locked = true;
            self.update_stats(|_| {});
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Read a frame, retrying transient failures.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        let retries = self.settings.read_retries.max(1);
        for attempt in 1..=retries {
            match self.source.read() {
                Ok(frame) => return Ok(frame),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => warn!("Could not read frame ({}/{}): {}", attempt, retries, e),
            }
        }
        warn!("Frame source failed {} times in a row, ending the stream", retries);
        Ok(None)
    }

    /// Process one frame.
    pub fn track_once(&mut self) -> Result<FrameOutcome> {
        let Some(frame) = self.next_frame()? else {
            return Ok(FrameOutcome::EndOfStream);
        };
        let mut gray = frame.to_gray();
        if let Some(roi) = &self.settings.roi {
            gray = image_ops::crop(&gray.view(), roi);
        }
        let frame_index = self.frame_count;
        self.frame_count += 1;

        if frame_index < self.settings.warmup_frames || !self.locked {
            self.detector.detect_arenas(&gray);
        }
        let mut valid = self.detector.validated();
        if valid.len() < self.settings.targets {
            warn!(
                "Frame {}: {} arenas found, {} expected. Discarding frame",
                frame_index,
                valid.len(),
                self.settings.targets
            );
            self.detector.relax();
            self.last_frame = Some(gray);
            self.update_stats(|s| {
                s.skipped_frames += 1;
                s.last_timestamp = frame.timestamp;
            });
            return Ok(FrameOutcome::Shortfall {
                frame_index,
                arenas: valid.len(),
            });
        }

        valid.truncate(self.settings.targets);
        self.arenas = assign_identity(&valid, self.settings.columns);
        if self.settings.auto_lock && self.frame_count >= self.settings.warmup_frames {
            self.lock_arenas();
        }

        let found = self.track_flies(frame_index, frame.timestamp, &gray);
        if let Some(previous) = self.previous_found {
            if previous != found {
                warn!(
                    "Frame {}: found {} flies, {} in the previous frame",
                    frame_index, found, previous
                );
            }
        }
        self.previous_found = Some(found);
        self.last_frame = Some(gray);
        self.update_stats(|s| {
            s.tracked_frames += 1;
            s.found_flies = found;
            s.last_timestamp = frame.timestamp;
        });

        Ok(FrameOutcome::Tracked { frame_index, found })
    }

    /// Look for one fly in every arena and emit what was found.
    fn track_flies(&self, frame_index: u64, timestamp: f64, gray: &Gray) -> usize {
        let binary = image_ops::adaptive_threshold(
            gray,
            self.settings.adaptive_block,
            self.settings.adaptive_offset,
            self.settings.fly_polarity,
        );
        let pin_state = self
            .pins
            .as_ref()
            .map(PinState::snapshot)
            .unwrap_or_default();

        let mut found = 0;
        for arena in &self.arenas {
            let flies: Vec<Fly> = find_flies(arena, &binary)
                .iter()
                .map(|region| Fly::from_region(region, arena))
                .filter(|fly| self.settings.fly.validate(fly, arena, gray))
                .collect();
            if flies.len() > 1 {
                warn!(
                    "Frame {}: {} flies in arena {}, keeping the largest",
                    frame_index,
                    flies.len(),
                    arena.identity
                );
            }

            match pick_fly(flies) {
                Some(fly) => {
                    found += 1;
                    self.emit(ResultRow::Position(PositionRecord {
                        frame_index,
                        timestamp,
                        arena_identity: arena.identity,
                        x: fly.relative.0,
                        y: fly.relative.1,
                        pin_state: pin_state.clone(),
                    }));
                }
                None => {
                    warn!("Frame {}: no fly in arena {}", frame_index, arena.identity);
                    self.update_stats(|s| {
                        s.missing_fly += 1;
                        *s.missing_per_arena.entry(arena.identity).or_default() += 1;
                    });
                    self.save_failed_crop(frame_index, arena, gray);
                }
            }
        }
        found
    }

    fn emit(&self, row: ResultRow) {
        if let Some(sink) = &self.sink {
            let written = sink
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .write(&row);
            if let Err(e) = written {
                error!("Could not write position: {}", e);
            }
        }
    }

    fn save_failed_crop(&self, frame_index: u64, arena: &Arena, gray: &Gray) {
        let Some(dir) = &self.settings.failed_arena_dir else {
            return;
        };
        let (height, width) = gray.dim();
        let (x1, y1) = arena.bottom_right();
        let (x0, y0) = (arena.bbox().x.min(width), arena.bbox().y.min(height));
        let crop = gray.slice(s![y0..y1.min(height), x0..x1.min(width)]);
        let (crop_height, crop_width) = crop.dim();

        let path = dir.join(format!("{:06}_{}.png", frame_index, arena.identity));
        let saved = fs::create_dir_all(dir)
            .map_err(LearnMemError::from)
            .and_then(|_| {
                let pixels: Vec<u8> = crop.iter().copied().collect();
                image::GrayImage::from_raw(crop_width as u32, crop_height as u32, pixels)
                    .ok_or_else(|| {
                        LearnMemError::Configuration("empty arena crop".to_owned())
                    })?
                    .save(&path)
                    .map_err(LearnMemError::from)
            });
        if let Err(e) = saved {
            warn!("Could not save {}: {}", path.display(), e);
        }
    }

    /// Track until the stream ends or a stop is requested, then flush the
    /// sink and release the frame source.
    pub fn run(&mut self) -> Result<TrackerStats> {
        Runnable::start(self);
        let result = loop {
            if self.halt.is_cancelled() {
                info!("Tracker : stop requested");
                break Ok(());
            }
            match self.track_once() {
                Ok(FrameOutcome::EndOfStream) => break Ok(()),
                Ok(_) => {}
                Err(e) => break Err(e),
            }
        };
        self.finish();
        result.map(|_| self.stats())
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        if let Some(sink) = &self.sink {
            let flushed = sink
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .flush();
            if let Err(e) = flushed {
                error!("Could not flush results: {}", e);
            }
        }
        if let Err(e) = self.source.close() {
            warn!("Could not close the frame source: {}", e);
        }
        self.status.stop();

        let stats = self.stats();
        info!(
            "Tracker : terminated. {} frames, {} tracked, {} skipped, {} missing flies",
            stats.frame_count, stats.tracked_frames, stats.skipped_frames, stats.missing_fly
        );
    }
}

impl Runnable for Tracker {
    fn start(&mut self) {
        if self.status.run(Instant::now()) {
            info!("Tracker : started");
        }
    }

    fn stop(&mut self) {
        self.halt.cancel();
        self.finish();
    }

    fn status(&self) -> Status {
        self.status.get()
    }
}

const TRACKER_KEYS: &[&str] = &[
    "targets",
    "columns",
    "min_arena_area",
    "relaxation_factor",
    "fly_min_area",
    "fly_max_area",
];

impl SettingsBridge for Tracker {
    fn get(&self, key: &str) -> Option<f64> {
        let value = match key {
            "targets" => self.settings.targets as f64,
            "columns" => self.settings.columns as f64,
            "min_arena_area" => self.detector.settings().min_area,
            "relaxation_factor" => self.detector.relaxation_factor(),
            "fly_min_area" => self.settings.fly.min_area as f64,
            "fly_max_area" => self.settings.fly.max_area as f64,
            _ => return None,
        };
        Some(value)
    }

    fn set(&mut self, key: &str, value: f64) -> bool {
        if !value.is_finite() || value < 0.0 {
            return false;
        }
        match key {
            "targets" => self.settings.targets = value as usize,
            "columns" if value >= 1.0 => self.settings.columns = value as usize,
            "min_arena_area" => {
                self.settings.detector.min_area = value;
                self.detector.settings_mut().min_area = value;
            }
            "relaxation_factor" => self.detector.set_relaxation_factor(value),
            "fly_min_area" => self.settings.fly.min_area = value as usize,
            "fly_max_area" => self.settings.fly.max_area = value as usize,
            _ => return false,
        }
        true
    }

    fn keys(&self) -> &'static [&'static str] {
        TRACKER_KEYS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result_writer::{self, MemorySink};
    use crate::synthetic::{SyntheticArenas, SyntheticSettings};
    use std::collections::VecDeque;

    fn settings() -> TrackerSettings {
        TrackerSettings {
            targets: 6,
            columns: 3,
            warmup_frames: 3,
            detector: ArenaDetectorSettings {
                window: 3,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn synthetic(frames: u64) -> SyntheticSettings {
        SyntheticSettings {
            frames,
            seed: 3,
            ..Default::default()
        }
    }

    fn tracker(source: impl FrameSource + 'static, settings: TrackerSettings) -> (Tracker, MemorySink) {
        let sink = MemorySink::new();
        let tracker = Tracker::new(Box::new(source), settings, &CancelToken::new())
            .sink(result_writer::shared(sink.clone()));
        (tracker, sink)
    }

    /// Frames given up front; `None` entries fail to read.
    struct StaticFrames {
        frames: VecDeque<Option<Gray>>,
    }

    impl StaticFrames {
        fn new(frames: Vec<Option<Gray>>) -> Self {
            Self {
                frames: frames.into(),
            }
        }
    }

    impl FrameSource for StaticFrames {
        fn read(&mut self) -> Result<Option<Frame>> {
            match self.frames.pop_front() {
                None => Ok(None),
                Some(None) => Err(LearnMemError::FrameUnavailable("no signal".to_owned())),
                Some(Some(gray)) => Ok(Some(Frame::gray(0.0, gray))),
            }
        }

        fn dimensions(&self) -> (usize, usize) {
            (100, 80)
        }

        fn close(&mut self) -> Result<()> {
            self.frames.clear();
            Ok(())
        }
    }

    /// Four arenas of 40x30. Arena at index 1 has no fly, arena at index 2
    /// has two.
    fn four_arenas() -> Gray {
        let mut frame = Gray::from_elem((90, 110), 30);
        let mut fill = |x0: usize, y0: usize, w: usize, h: usize, v: u8| {
            frame.slice_mut(s![y0..y0 + h, x0..x0 + w]).fill(v);
        };
        for (x, y) in [(10, 10), (60, 10), (10, 50), (60, 50)] {
            fill(x, y, 40, 30, 200);
        }
        fill(20, 20, 8, 5, 40);
        fill(14, 54, 10, 5, 40);
        fill(32, 66, 10, 8, 40);
        fill(75, 60, 8, 5, 40);
        frame
    }

    fn four_arena_settings() -> TrackerSettings {
        TrackerSettings {
            targets: 4,
            columns: 2,
            warmup_frames: 1,
            detector: ArenaDetectorSettings {
                window: 1,
                min_area: 900.0,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn positions_match_the_synthetic_truth() {
        let (mut tracker, sink) = tracker(SyntheticArenas::new(synthetic(8)), settings());
        let mut truth = SyntheticArenas::new(synthetic(8));
        let origins = truth.arena_origins();

        for frame_index in 0..8 {
            truth.read().unwrap();
            let outcome = tracker.track_once().unwrap();
            assert_eq!(outcome, FrameOutcome::Tracked { frame_index, found: 6 });

            for arena in tracker.last_arenas() {
                let (x, y) = arena.top_left();
                let index = origins.iter().position(|&o| o == (x, y)).unwrap();
                let record = sink
                    .positions()
                    .into_iter()
                    .find(|p| p.frame_index == frame_index && p.arena_identity == arena.identity)
                    .unwrap();
                let (tx, ty) = truth.truth()[index];
                assert!((record.x - tx).abs() < 1e-9, "x {} vs {}", record.x, tx);
                assert!((record.y - ty).abs() < 1e-9, "y {} vs {}", record.y, ty);
            }
        }
        assert_eq!(sink.positions().len(), 48);
        assert!(tracker.is_locked());
    }

    #[test]
    fn short_frames_are_skipped_not_fatal() {
        let source = SyntheticArenas::new(SyntheticSettings {
            blank_frames: [4].into_iter().collect(),
            ..synthetic(10)
        });
        let tracker_settings = TrackerSettings {
            auto_lock: false,
            detector: ArenaDetectorSettings {
                window: 1,
                ..Default::default()
            },
            ..settings()
        };
        let (mut tracker, sink) = tracker(source, tracker_settings);

        let stats = tracker.run().unwrap();

        assert_eq!(stats.frame_count, 10);
        assert_eq!(stats.skipped_frames, 1);
        assert_eq!(stats.tracked_frames, 9);
        assert!(stats.relaxation_factor < 1.0);
        let mut frames: Vec<u64> = sink.positions().iter().map(|p| p.frame_index).collect();
        frames.dedup();
        assert_eq!(frames, vec![0, 1, 2, 3, 5, 6, 7, 8, 9]);
        assert_eq!(sink.flushes(), 1);
        assert_eq!(tracker.status(), Status::Stopped);
    }

    #[test]
    fn missing_and_extra_flies() {
        let dir = tempfile::tempdir().unwrap();
        let source = StaticFrames::new(vec![Some(four_arenas()), Some(four_arenas())]);
        let (mut tracker, sink) = tracker(
            source,
            TrackerSettings {
                failed_arena_dir: Some(dir.path().to_path_buf()),
                ..four_arena_settings()
            },
        );

        assert_eq!(
            tracker.track_once().unwrap(),
            FrameOutcome::Tracked { frame_index: 0, found: 3 }
        );
        let stats = tracker.stats();
        assert_eq!(stats.missing_fly, 1);

        // the arena at (60, 10) has no fly
        let empty = tracker
            .last_arenas()
            .iter()
            .find(|a| a.top_left() == (60, 10))
            .unwrap()
            .identity;
        assert_eq!(stats.missing_per_arena.get(&empty), Some(&1));
        assert!(dir.path().join(format!("000000_{}.png", empty)).exists());
        assert!(sink.positions().iter().all(|p| p.arena_identity != empty));

        // the larger of the two candidates at (10, 50) is kept
        let crowded = tracker
            .last_arenas()
            .iter()
            .find(|a| a.top_left() == (10, 50))
            .unwrap()
            .clone();
        let record = sink
            .positions()
            .into_iter()
            .find(|p| p.arena_identity == crowded.identity)
            .unwrap();
        assert_eq!((record.x, record.y), (36.5 - 30.0, 69.5 - 65.0));

        tracker.track_once().unwrap();
        assert_eq!(tracker.stats().missing_fly, 2);
    }

    #[test]
    fn round_arenas_find_their_flies() {
        let mut frame = Gray::from_elem((115, 115), 30);
        let centers: [(usize, usize); 4] = [(30, 30), (85, 30), (30, 85), (85, 85)];
        for ((y, x), pixel) in frame.indexed_iter_mut() {
            let inside = centers
                .iter()
                .any(|&(cx, cy)| (x as f64 - cx as f64).hypot(y as f64 - cy as f64) <= 20.0);
            if inside {
                *pixel = 200;
            }
        }
        for (cx, cy) in centers {
            frame.slice_mut(s![cy - 2..cy + 2, cx - 3..cx + 3]).fill(40);
        }

        let source = StaticFrames::new(vec![Some(frame)]);
        let (mut tracker, sink) = tracker(source, four_arena_settings());
        assert_eq!(
            tracker.track_once().unwrap(),
            FrameOutcome::Tracked { frame_index: 0, found: 4 }
        );
        let positions = sink.positions();
        assert_eq!(positions.len(), 4);
        // the floor around each disk must not be mistaken for a fly
        for p in positions {
            assert!(p.x.abs() < 2.5 && p.y.abs() < 2.5, "({}, {})", p.x, p.y);
        }
    }

    #[test]
    fn locked_arenas_survive_a_blank_frame() {
        let blank = Gray::from_elem((90, 110), 30);
        let source = StaticFrames::new(vec![Some(four_arenas()), Some(blank)]);
        let (mut tracker, _) = tracker(source, four_arena_settings());

        tracker.track_once().unwrap();
        assert!(tracker.is_locked());
        assert_eq!(
            tracker.track_once().unwrap(),
            FrameOutcome::Tracked { frame_index: 1, found: 0 }
        );
        assert_eq!(tracker.stats().missing_fly, 1 + 4);
    }

    #[test]
    fn transient_read_failures_are_retried() {
        let source = StaticFrames::new(vec![None, None, Some(four_arenas()), None]);
        let (mut tracker, _) = tracker(
            source,
            TrackerSettings {
                read_retries: 3,
                ..four_arena_settings()
            },
        );
        assert!(matches!(
            tracker.track_once().unwrap(),
            FrameOutcome::Tracked { frame_index: 0, .. }
        ));
        assert_eq!(tracker.track_once().unwrap(), FrameOutcome::EndOfStream);
    }

    #[test]
    fn stop_request_ends_run_and_flushes() {
        let (mut tracker, sink) = tracker(SyntheticArenas::new(synthetic(1000)), settings());
        let handle = tracker.handle();
        handle.stop();
        let stats = tracker.run().unwrap();
        assert_eq!(stats.frame_count, 0);
        assert_eq!(sink.flushes(), 1);

        // stopping again is harmless
        tracker.stop();
        assert_eq!(sink.flushes(), 1);
    }

    #[test]
    fn records_carry_pin_state() {
        let pins = PinState::with_hardware(["LED", "SHOCK"]);
        pins.set("SHOCK", 1.0);
        let source = StaticFrames::new(vec![Some(four_arenas())]);
        let (tracker, sink) = tracker(source, four_arena_settings());
        let mut tracker = tracker.pin_state(pins);
        tracker.track_once().unwrap();
        let record = &sink.positions()[0];
        assert_eq!(record.pin_state["SHOCK"], 1.0);
        assert_eq!(record.pin_state["LED"], 0.0);
    }

    #[test]
    fn roi_crops_before_detection() {
        let source = StaticFrames::new(vec![Some(four_arenas())]);
        let (mut tracker, _) = tracker(
            source,
            TrackerSettings {
                targets: 2,
                roi: Some(Roi { x: 0, y: 0, width: 110, height: 45 }),
                ..four_arena_settings()
            },
        );
        tracker.track_once().unwrap();
        assert_eq!(tracker.last_frame().unwrap().dim(), (45, 110));
        assert_eq!(tracker.last_arenas().len(), 2);
    }

    #[test]
    fn settings_bridge() {
        let (mut tracker, _) = tracker(StaticFrames::new(Vec::new()), settings());
        assert!(tracker.set("min_arena_area", 500.0));
        assert_eq!(SettingsBridge::get(&tracker, "min_arena_area"), Some(500.0));
        assert!(tracker.set("targets", 4.0));
        assert_eq!(tracker.settings().targets, 4);
        assert!(!tracker.set("exposure", 1.0));
        assert_eq!(SettingsBridge::get(&tracker, "relaxation_factor"), Some(1.0));
    }
}
