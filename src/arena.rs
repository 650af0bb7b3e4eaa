//! Arena detection and identity assignment.
//!
//! The detector keeps a rolling window of the last frames, averages them and
//! segments the average: Gaussian blur, Otsu threshold, hole filling and a
//! morphological close so that one physical arena yields one region. Region
//! validation uses a minimum area that relaxes each time a frame comes up
//! short of the target count.

use crate::cluster::kmeans_1d;
use crate::contour::{regions, BoundingBox, Region};
use crate::image_ops::{self, Gray};

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One validated arena with its stable identity.
#[derive(Debug, Clone, PartialEq)]
pub struct Arena {
    /// 1-based, column by column.
    pub identity: usize,
    /// 0-based, left to right.
    pub column: usize,
    /// Center of the bounding box, `(x, y)`.
    pub center: (f64, f64),
    /// The segmented shape, pixels included.
    pub region: Region,
}

impl Arena {
    pub fn bbox(&self) -> BoundingBox {
        self.region.bbox
    }

    pub fn top_left(&self) -> (usize, usize) {
        self.region.bbox.top_left()
    }

    pub fn bottom_right(&self) -> (usize, usize) {
        self.region.bbox.bottom_right()
    }

    /// Signed distance from `(x, y)` to the arena outline, positive inside.
    pub fn margin(&self, x: f64, y: f64) -> f64 {
        self.region.margin(x, y)
    }
}

/// Tunables of [`ArenaDetector`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaDetectorSettings {
    /// Frames averaged before segmentation.
    pub window: usize,
    pub blur_kernel: usize,
    pub morph_radius: usize,
    pub morph_iterations: usize,
    /// Minimum area of a valid arena, before relaxation.
    pub min_area: f64,
    /// Multiplier applied to the relaxation factor after a shortfall.
    pub relaxation_decay: f64,
    /// The relaxation factor never drops below this.
    pub relaxation_floor: f64,
}

impl Default for ArenaDetectorSettings {
    fn default() -> Self {
        Self {
            window: 10,
            blur_kernel: 5,
            morph_radius: 2,
            morph_iterations: 2,
            min_area: 1000.0,
            relaxation_decay: 0.99,
            relaxation_floor: 0.05,
        }
    }
}

pub struct ArenaDetector {
    settings: ArenaDetectorSettings,
    frames: VecDeque<Gray>,
    candidates: Vec<Region>,
    relaxation: f64,
}

impl ArenaDetector {
    pub fn new(settings: ArenaDetectorSettings) -> Self {
        Self {
            settings,
            frames: VecDeque::new(),
            candidates: Vec::new(),
            relaxation: 1.0,
        }
    }

    pub fn settings(&self) -> &ArenaDetectorSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut ArenaDetectorSettings {
        &mut self.settings
    }

    /// Add `gray` to the rolling window and segment the new average. Returns
    /// every candidate region, valid or not.
    pub fn detect_arenas(&mut self, gray: &Gray) -> &[Region] {
        if self.frames.front().is_some_and(|f| f.dim() != gray.dim()) {
            self.frames.clear();
        }
        self.frames.push_back(gray.clone());
        while self.frames.len() > self.settings.window.max(1) {
            self.frames.pop_front();
        }

        if let Some(average) = image_ops::average(&self.frames) {
            self.candidates = segment(&average, &self.settings);
            debug!("{} candidate arenas", self.candidates.len());
        }
        &self.candidates
    }

    /// The regions found by the last detection.
    pub fn candidates(&self) -> &[Region] {
        &self.candidates
    }

    pub fn validate_arena(&self, region: &Region) -> bool {
        region.area as f64 >= self.settings.min_area * self.relaxation
    }

    /// Valid candidates, largest first.
    pub fn validated(&self) -> Vec<Region> {
        let mut valid: Vec<Region> = self
            .candidates
            .iter()
            .filter(|r| self.validate_arena(r))
            .cloned()
            .collect();
        valid.sort_by(|a, b| b.area.cmp(&a.area));
        valid
    }

    /// Loosen validation after a frame came up short.
    pub fn relax(&mut self) {
        self.relaxation =
            (self.relaxation * self.settings.relaxation_decay).max(self.settings.relaxation_floor);
    }

    pub fn relaxation_factor(&self) -> f64 {
        self.relaxation
    }

    pub fn set_relaxation_factor(&mut self, factor: f64) {
        self.relaxation = factor.clamp(self.settings.relaxation_floor, 1.0);
    }
}

fn segment(average: &Gray, settings: &ArenaDetectorSettings) -> Vec<Region> {
    let blurred = image_ops::gaussian_blur(average, settings.blur_kernel);
    let level = image_ops::otsu_threshold(&blurred);
    let binary = image_ops::threshold(&blurred, level);
    let filled = image_ops::fill_holes(&binary);
    let merged = image_ops::close(&filled, settings.morph_radius, settings.morph_iterations);
    regions(&merged)
}

/// Give `found` arenas their identities: group centers into `columns` by x,
/// order columns left to right, within a column by descending y, then by x.
/// Identities run from 1 in that order.
pub fn assign_identity(found: &[Region], columns: usize) -> Vec<Arena> {
    let xs: Vec<f64> = found.iter().map(|r| r.bbox.center().0).collect();
    let labels = kmeans_1d(&xs, columns.max(1), 50);

    let mut arenas: Vec<Arena> = found
        .iter()
        .zip(labels)
        .map(|(region, column)| Arena {
            identity: 0,
            column,
            center: region.bbox.center(),
            region: region.clone(),
        })
        .collect();
    arenas.sort_by(|a, b| {
        a.column
            .cmp(&b.column)
            .then(b.center.1.total_cmp(&a.center.1))
            .then(a.center.0.total_cmp(&b.center.0))
    });
    for (i, arena) in arenas.iter_mut().enumerate() {
        arena.identity = i + 1;
    }
    arenas
}
