//! Finding and validating the one fly inside each arena.

use crate::arena::Arena;
use crate::contour::{regions, BoundingBox, Region};
use crate::image_ops::{Gray, Mask};

use log::debug;
use ndarray::{s, Zip};
use serde::{Deserialize, Serialize};

/// Which side of the bound an intensity must fall on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntensityDirection {
    Above,
    Below,
}

/// A bound on the gray level at a candidate's reference pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntensityBound {
    pub value: u8,
    pub direction: IntensityDirection,
}

impl IntensityBound {
    pub fn accepts(&self, intensity: u8) -> bool {
        match self.direction {
            IntensityDirection::Above => intensity > self.value,
            IntensityDirection::Below => intensity < self.value,
        }
    }
}

/// Everything a candidate must satisfy to count as a fly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlyCriteria {
    /// The bounding box diagonal must be longer than this.
    pub min_length: f64,
    /// Checked at the top-left pixel of the bounding box.
    pub intensity: IntensityBound,
    pub min_area: usize,
    pub max_area: usize,
    /// The center must be at least this far inside the arena outline.
    pub min_margin: f64,
}

impl Default for FlyCriteria {
    fn default() -> Self {
        Self {
            min_length: 3.0,
            intensity: IntensityBound {
                value: 10,
                direction: IntensityDirection::Above,
            },
            min_area: 10,
            max_area: 400,
            min_margin: 1.0,
        }
    }
}

/// A candidate object inside one arena, for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Fly {
    pub area: usize,
    pub bbox: BoundingBox,
    pub diagonal: f64,
    /// `(x, y)` in frame coordinates.
    pub center: (f64, f64),
    /// `(x, y)` relative to the arena center.
    pub relative: (f64, f64),
}

impl Fly {
    pub fn from_region(region: &Region, arena: &Arena) -> Self {
        Self {
            area: region.area,
            bbox: region.bbox,
            diagonal: region.bbox.diagonal(),
            center: region.centroid,
            relative: (
                region.centroid.0 - arena.center.0,
                region.centroid.1 - arena.center.1,
            ),
        }
    }
}

impl FlyCriteria {
    /// Whether `fly` passes every check against its arena and the gray
    /// frame it was found in.
    pub fn validate(&self, fly: &Fly, arena: &Arena, gray: &Gray) -> bool {
        let long_enough = fly.diagonal > self.min_length;
        let intensity = gray.get([fly.bbox.y, fly.bbox.x]).copied().unwrap_or(0);
        let bright_enough = self.intensity.accepts(intensity);
        let sized = fly.area >= self.min_area && fly.area <= self.max_area;
        let inside = arena.margin(fly.center.0, fly.center.1) >= self.min_margin;

        debug!(
            "Arena {} candidate at ({:.1}, {:.1}): length {} intensity {} area {} inside {}",
            arena.identity,
            fly.center.0,
            fly.center.1,
            long_enough,
            bright_enough,
            sized,
            inside
        );
        long_enough && bright_enough && sized && inside
    }
}

/// Candidate regions of `binary` made of `arena` pixels only, in frame
/// coordinates.
pub fn find_flies(arena: &Arena, binary: &Mask) -> Vec<Region> {
    let (height, width) = binary.dim();
    let bbox = arena.bbox();
    let (x1, y1) = arena.bottom_right();
    let (x0, y0) = (bbox.x.min(width), bbox.y.min(height));
    let (x1, y1) = (x1.min(width), y1.min(height));

    let mut inside = binary.slice(s![y0..y1, x0..x1]).to_owned();
    let own = arena.region.pixels.slice(s![..y1 - y0, ..x1 - x0]);
    Zip::from(&mut inside)
        .and(&own)
        .for_each(|pixel, &member| *pixel &= member);
    regions(&inside)
        .iter()
        .map(|r| r.offset(x0, y0))
        .collect()
}

/// The largest fly, if any. Ties go to the first.
pub fn pick_fly(mut flies: Vec<Fly>) -> Option<Fly> {
    let mut best: Option<usize> = None;
    for (i, fly) in flies.iter().enumerate() {
        if best.map_or(true, |b| fly.area > flies[b].area) {
            best = Some(i);
        }
    }
    best.map(|i| flies.swap_remove(i))
}
