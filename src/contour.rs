//! Regions extracted from binary images, and their shape measurements.

use crate::image_ops::{connected_components, Mask};

/// An axis-aligned box, inclusive of `x..x + width` and `y..y + height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl BoundingBox {
    /// Top-left corner as `(x, y)`.
    pub fn top_left(&self) -> (usize, usize) {
        (self.x, self.y)
    }

    /// Bottom-right corner as `(x, y)`, exclusive.
    pub fn bottom_right(&self) -> (usize, usize) {
        (self.x + self.width, self.y + self.height)
    }

    /// Center as `(x, y)`.
    pub fn center(&self) -> (f64, f64) {
        (
            self.x as f64 + self.width as f64 / 2.0,
            self.y as f64 + self.height as f64 / 2.0,
        )
    }

    /// Length of the diagonal.
    pub fn diagonal(&self) -> f64 {
        ((self.width * self.width + self.height * self.height) as f64).sqrt()
    }

    /// This box moved by `(dx, dy)`.
    pub fn offset(&self, dx: usize, dy: usize) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..*self
        }
    }
}

/// One connected foreground region.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    /// Pixel count.
    pub area: usize,
    pub bbox: BoundingBox,
    /// Mean pixel position as `(x, y)`.
    pub centroid: (f64, f64),
    /// The region's own pixels, indexed `[y, x]` from the top-left of `bbox`.
    pub pixels: Mask,
}

impl Region {
    /// This region moved by `(dx, dy)`.
    pub fn offset(&self, dx: usize, dy: usize) -> Self {
        Self {
            area: self.area,
            bbox: self.bbox.offset(dx, dy),
            centroid: (self.centroid.0 + dx as f64, self.centroid.1 + dy as f64),
            pixels: self.pixels.clone(),
        }
    }

    /// Whether the pixel at `(x, y)`, in frame coordinates, belongs to the
    /// region.
    pub fn contains(&self, x: i64, y: i64) -> bool {
        let (lx, ly) = (x - self.bbox.x as i64, y - self.bbox.y as i64);
        lx >= 0
            && ly >= 0
            && self
                .pixels
                .get([ly as usize, lx as usize])
                .copied()
                .unwrap_or(false)
    }

    /// Signed distance from `(x, y)` to the region outline: positive inside,
    /// negative outside. The outline runs halfway between the outermost
    /// region pixels and their outside neighbours.
    pub fn margin(&self, x: f64, y: f64) -> f64 {
        let inside = self.contains((x + 0.5).floor() as i64, (y + 0.5).floor() as i64);
        let (bx, by) = (self.bbox.x as f64, self.bbox.y as f64);
        let (right, bottom) = self.bbox.bottom_right();

        // Everything past the box is outside, so the ring around it bounds
        // the distance to the nearest outside pixel.
        let mut nearest = if inside {
            (x - (bx - 1.0))
                .min(right as f64 - x)
                .min(y - (by - 1.0))
                .min(bottom as f64 - y)
        } else {
            f64::INFINITY
        };
        for ((py, px), &member) in self.pixels.indexed_iter() {
            if member != inside {
                let d = (bx + px as f64 - x).hypot(by + py as f64 - y);
                nearest = nearest.min(d);
            }
        }

        if inside {
            nearest - 0.5
        } else {
            -(nearest - 0.5)
        }
    }
}

#[derive(Clone, Copy)]
struct Accumulator {
    area: usize,
    min: (usize, usize),
    max: (usize, usize),
    sum: (f64, f64),
}

/// Every 8-connected region of `mask`, in raster order of its first pixel.
pub fn regions(mask: &Mask) -> Vec<Region> {
    let (labels, count) = connected_components(mask);
    let mut acc = vec![
        Accumulator {
            area: 0,
            min: (usize::MAX, usize::MAX),
            max: (0, 0),
            sum: (0.0, 0.0),
        };
        count
    ];

    for ((y, x), &label) in labels.indexed_iter() {
        if label == 0 {
            continue;
        }
        let a = &mut acc[label - 1];
        a.area += 1;
        a.min = (a.min.0.min(x), a.min.1.min(y));
        a.max = (a.max.0.max(x), a.max.1.max(y));
        a.sum = (a.sum.0 + x as f64, a.sum.1 + y as f64);
    }

    let mut found: Vec<Region> = acc
        .iter()
        .map(|a| Region {
            area: a.area,
            bbox: BoundingBox {
                x: a.min.0,
                y: a.min.1,
                width: a.max.0 - a.min.0 + 1,
                height: a.max.1 - a.min.1 + 1,
            },
            centroid: (a.sum.0 / a.area as f64, a.sum.1 / a.area as f64),
            pixels: Mask::from_elem((a.max.1 - a.min.1 + 1, a.max.0 - a.min.0 + 1), false),
        })
        .collect();
    for ((y, x), &label) in labels.indexed_iter() {
        if label > 0 {
            let r = &mut found[label - 1];
            r.pixels[[y - r.bbox.y, x - r.bbox.x]] = true;
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measures_regions() {
        let mut mask = Mask::from_elem((10, 12), false);
        for y in 2..5 {
            for x in 3..7 {
                mask[[y, x]] = true;
            }
        }
        mask[[8, 10]] = true;

        let found = regions(&mask);
        assert_eq!(found.len(), 2);
        let block = &found[0];
        assert_eq!(block.area, 12);
        assert_eq!(block.bbox, BoundingBox { x: 3, y: 2, width: 4, height: 3 });
        assert_eq!(block.centroid, (4.5, 3.0));
        assert_eq!(block.bbox.diagonal(), 5.0);
        assert_eq!(found[1].area, 1);
    }

    #[test]
    fn region_keeps_its_own_pixels() {
        let mut mask = Mask::from_elem((8, 8), false);
        // an L: a column and a foot
        for y in 1..7 {
            mask[[y, 2]] = true;
        }
        for x in 3..6 {
            mask[[6, x]] = true;
        }
        let l = &regions(&mask)[0];
        assert_eq!(l.bbox, BoundingBox { x: 2, y: 1, width: 4, height: 6 });
        assert_eq!(l.pixels.iter().filter(|&&p| p).count(), l.area);
        assert!(l.contains(2, 3));
        assert!(l.contains(5, 6));
        // inside the box, outside the L
        assert!(!l.contains(4, 3));
        assert!(!l.contains(0, 0));
    }

    #[test]
    fn margin_follows_the_outline() {
        let mut mask = Mask::from_elem((40, 40), false);
        for y in 0..40 {
            for x in 0..40 {
                let (dx, dy) = (x as f64 - 20.0, y as f64 - 20.0);
                mask[[y, x]] = dx.hypot(dy) <= 15.0;
            }
        }
        let disk = &regions(&mask)[0];
        assert_eq!(disk.bbox, BoundingBox { x: 5, y: 5, width: 31, height: 31 });

        // the nearest outside pixels are (5, 19) and its mirrors
        let center = disk.margin(20.0, 20.0);
        assert!((center - 14.53).abs() < 0.01, "{}", center);
        // a box corner is well outside the disk
        assert!(disk.margin(6.0, 6.0) < -4.0);
        let rim = disk.margin(20.0, 6.0);
        assert!(rim > 0.0 && rim < 1.5, "{}", rim);
        assert!((disk.margin(20.0, 3.0) + 1.5).abs() < 1e-9);
    }
}
