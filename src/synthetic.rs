//! A generated frame stream: a grid of bright arenas on a dark background,
//! each with one dark fly wandering inside it.
//!
//! Useful without a camera, and in tests, since the true fly positions are
//! known. Chosen frames can be blanked (no arenas visible) or made to fail
//! their first read.

use crate::error::{LearnMemError, Result};
use crate::frame_source::{Frame, FrameSource};
use crate::image_ops::Gray;

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

const BACKGROUND: u8 = 30;
const ARENA: u8 = 200;
const FLY: u8 = 40;
const NOISE: i16 = 4;

/// Layout and behavior of a [`SyntheticArenas`] stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticSettings {
    pub rows: usize,
    pub columns: usize,
    pub arena_width: usize,
    pub arena_height: usize,
    /// Space between arenas, and around the grid.
    pub gap: usize,
    pub fly_width: usize,
    pub fly_height: usize,
    /// Largest fly step per frame, in pixels.
    pub fly_speed: usize,
    pub frames: u64,
    pub fps: f64,
    pub seed: u64,
    /// Frames rendered without any arena.
    pub blank_frames: BTreeSet<u64>,
    /// Frames whose first read fails.
    pub failing_reads: BTreeSet<u64>,
}

impl Default for SyntheticSettings {
    fn default() -> Self {
        Self {
            rows: 2,
            columns: 3,
            arena_width: 60,
            arena_height: 40,
            gap: 20,
            fly_width: 8,
            fly_height: 5,
            fly_speed: 2,
            frames: 100,
            fps: 10.0,
            seed: 0,
            blank_frames: BTreeSet::new(),
            failing_reads: BTreeSet::new(),
        }
    }
}

/// Keeps the fly this many pixels away from its arena's edges.
const FLY_MARGIN: usize = 4;

pub struct SyntheticArenas {
    settings: SyntheticSettings,
    rng: StdRng,
    next: u64,
    flies: Vec<(usize, usize)>,
    truth: Vec<(f64, f64)>,
    closed: bool,
}

impl SyntheticArenas {
    pub fn new(settings: SyntheticSettings) -> Self {
        let mut rng = StdRng::seed_from_u64(settings.seed);
        let flies = (0..settings.rows * settings.columns)
            .map(|_| {
                (
                    rng.gen_range(0..=Self::free_x(&settings)),
                    rng.gen_range(0..=Self::free_y(&settings)),
                )
            })
            .collect();
        Self {
            settings,
            rng,
            next: 0,
            flies,
            truth: Vec::new(),
            closed: false,
        }
    }

    fn free_x(settings: &SyntheticSettings) -> usize {
        settings
            .arena_width
            .saturating_sub(settings.fly_width + 2 * FLY_MARGIN)
    }

    fn free_y(settings: &SyntheticSettings) -> usize {
        settings
            .arena_height
            .saturating_sub(settings.fly_height + 2 * FLY_MARGIN)
    }

    /// Top-left corner of every arena, row by row.
    pub fn arena_origins(&self) -> Vec<(usize, usize)> {
        let s = &self.settings;
        (0..s.rows)
            .flat_map(|row| {
                (0..s.columns).map(move |col| {
                    (
                        s.gap + col * (s.arena_width + s.gap),
                        s.gap + row * (s.arena_height + s.gap),
                    )
                })
            })
            .collect()
    }

    /// True fly centers of the last rendered frame, relative to their arena
    /// centers, in the order of [`SyntheticArenas::arena_origins`].
    pub fn truth(&self) -> &[(f64, f64)] {
        &self.truth
    }

    fn step(&mut self) {
        let speed = self.settings.fly_speed as isize;
        let (max_x, max_y) = (
            Self::free_x(&self.settings) as isize,
            Self::free_y(&self.settings) as isize,
        );
        for fly in self.flies.iter_mut() {
            let dx = self.rng.gen_range(-speed..=speed);
            let dy = self.rng.gen_range(-speed..=speed);
            fly.0 = (fly.0 as isize + dx).clamp(0, max_x) as usize;
            fly.1 = (fly.1 as isize + dy).clamp(0, max_y) as usize;
        }
    }

    fn render(&mut self, blank: bool) -> Gray {
        let (width, height) = self.dimensions();
        let mut image = Gray::from_elem((height, width), BACKGROUND);
        self.truth.clear();

        if !blank {
            let s = self.settings.clone();
            for ((ax, ay), &(fx, fy)) in self.arena_origins().into_iter().zip(&self.flies) {
                image
                    .slice_mut(ndarray::s![ay..ay + s.arena_height, ax..ax + s.arena_width])
                    .fill(ARENA);
                let (x0, y0) = (ax + FLY_MARGIN + fx, ay + FLY_MARGIN + fy);
                image
                    .slice_mut(ndarray::s![y0..y0 + s.fly_height, x0..x0 + s.fly_width])
                    .fill(FLY);

                let fly_center = (
                    x0 as f64 + (s.fly_width as f64 - 1.0) / 2.0,
                    y0 as f64 + (s.fly_height as f64 - 1.0) / 2.0,
                );
                let arena_center = (
                    ax as f64 + s.arena_width as f64 / 2.0,
                    ay as f64 + s.arena_height as f64 / 2.0,
                );
                self.truth.push((
                    fly_center.0 - arena_center.0,
                    fly_center.1 - arena_center.1,
                ));
            }
        }

        for pixel in image.iter_mut() {
            let noise = self.rng.gen_range(-NOISE..=NOISE);
            *pixel = (*pixel as i16 + noise).clamp(0, 255) as u8;
        }
        image
    }
}

impl FrameSource for SyntheticArenas {
    fn read(&mut self) -> Result<Option<Frame>> {
        if self.closed || self.next >= self.settings.frames {
            return Ok(None);
        }
        let index = self.next;
        if self.settings.failing_reads.remove(&index) {
            return Err(LearnMemError::FrameUnavailable(format!(
                "synthetic frame {} dropped",
                index
            )));
        }

        self.next += 1;
        if index > 0 {
            self.step();
        }
        let blank = self.settings.blank_frames.contains(&index);
        let image = self.render(blank);
        Ok(Some(Frame::gray(index as f64 / self.settings.fps, image)))
    }

    fn dimensions(&self) -> (usize, usize) {
        let s = &self.settings;
        (
            s.gap + s.columns * (s.arena_width + s.gap),
            s.gap + s.rows * (s.arena_height + s.gap),
        )
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_frames() {
        let settings = SyntheticSettings {
            frames: 3,
            seed: 42,
            ..Default::default()
        };
        let mut a = SyntheticArenas::new(settings.clone());
        let mut b = SyntheticArenas::new(settings);
        for _ in 0..3 {
            assert_eq!(a.read().unwrap(), b.read().unwrap());
        }
        assert!(a.read().unwrap().is_none());
    }

    #[test]
    fn layout_and_fly_are_drawn() {
        let mut source = SyntheticArenas::new(SyntheticSettings::default());
        assert_eq!(source.dimensions(), (20 + 3 * 80, 20 + 2 * 60));
        let frame = source.read().unwrap().unwrap().to_gray();

        let (ax, ay) = source.arena_origins()[4];
        assert_eq!((ax, ay), (100, 80));
        assert!(frame[[ay + 1, ax + 1]] > 150);
        assert!(frame[[ay - 5, ax - 5]] < 50);

        let (dx, dy) = source.truth()[4];
        let fly_x = (ax as f64 + 30.0 + dx).round() as usize;
        let fly_y = (ay as f64 + 20.0 + dy).round() as usize;
        assert!(frame[[fly_y, fly_x]] < 50);
    }

    #[test]
    fn chosen_frames_are_blank_or_fail_once() {
        let mut source = SyntheticArenas::new(SyntheticSettings {
            frames: 3,
            blank_frames: [1].into_iter().collect(),
            failing_reads: [2].into_iter().collect(),
            ..Default::default()
        });
        source.read().unwrap();
        let blank = source.read().unwrap().unwrap().to_gray();
        assert!(blank.iter().all(|&p| p < 50));
        assert!(matches!(source.read(), Err(LearnMemError::FrameUnavailable(_))));
        assert_eq!(source.read().unwrap().unwrap().timestamp, 0.2);
        assert!(source.read().unwrap().is_none());
    }
}
