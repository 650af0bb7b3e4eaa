//! Grayscale image operations used by arena and fly detection.
//!
//! Images are `ndarray` arrays indexed `[[y, x]]`. Binary images are
//! [`Mask`]s of `bool`.
//!
//! # Key Algorithms
//!
//! ## Otsu Thresholding
//! Picks the gray level that maximizes between-class variance of the
//! histogram, separating bright arenas from the dark background.
//!
//! ## Adaptive Mean Thresholding
//! Compares every pixel with the mean of the block around it, computed from
//! an integral image, so uneven lighting across the frame does not matter.
//!
//! ## Connected Components
//! Two-pass labeling with union-find over 8-connected neighbors.

use ndarray::{s, Array2, ArrayView2, Zip};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// An 8-bit grayscale image.
pub type Gray = Array2<u8>;

/// A binary image.
pub type Mask = Array2<bool>;

/// A rectangular region of interest in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

/// Which side of a threshold counts as foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Polarity {
    /// Foreground is brighter than its surroundings.
    Bright,
    /// Foreground is darker than its surroundings.
    Dark,
}

/// ITU-R 601 luma.
pub fn rgb_to_gray(r: u8, g: u8, b: u8) -> u8 {
    (0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64)
        .round()
        .clamp(0.0, 255.0) as u8
}

/// Cut `roi` out of `image`. The region is clipped to the image.
pub fn crop(image: &ArrayView2<u8>, roi: &Roi) -> Gray {
    let (height, width) = image.dim();
    let x0 = roi.x.min(width);
    let y0 = roi.y.min(height);
    let x1 = (roi.x + roi.width).min(width);
    let y1 = (roi.y + roi.height).min(height);
    image.slice(s![y0..y1, x0..x1]).to_owned()
}

/// Pixel-wise mean of `frames`, which must all have the same shape.
pub fn average(frames: &VecDeque<Gray>) -> Option<Gray> {
    let first = frames.front()?;
    let mut sum = Array2::<u32>::zeros(first.dim());
    for frame in frames.iter().filter(|f| f.dim() == first.dim()) {
        Zip::from(&mut sum).and(frame).for_each(|s, &p| *s += p as u32);
    }
    let n = frames.iter().filter(|f| f.dim() == first.dim()).count() as u32;
    Some(sum.mapv(|s| ((s + n / 2) / n) as u8))
}

fn gaussian_kernel(size: usize) -> Vec<f64> {
    let size = (size | 1).max(1);
    let sigma = 0.3 * ((size as f64 - 1.0) * 0.5 - 1.0) + 0.8;
    let half = (size / 2) as isize;
    let weights: Vec<f64> = (-half..=half)
        .map(|i| (-((i * i) as f64) / (2.0 * sigma * sigma)).exp())
        .collect();
    let total: f64 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}

/// Gaussian blur with a square `size` kernel (rounded up to odd). Sigma is
/// derived from the size. Edge pixels are replicated.
pub fn gaussian_blur(image: &Gray, size: usize) -> Gray {
    let kernel = gaussian_kernel(size);
    let half = (kernel.len() / 2) as isize;
    let (height, width) = image.dim();
    if height == 0 || width == 0 {
        return image.clone();
    }
    let clamp = |v: isize, max: usize| v.clamp(0, max as isize - 1) as usize;

    let mut rows = Array2::<f64>::zeros((height, width));
    for ((y, x), out) in rows.indexed_iter_mut() {
        *out = kernel
            .iter()
            .enumerate()
            .map(|(k, w)| w * image[[y, clamp(x as isize + k as isize - half, width)]] as f64)
            .sum();
    }

    let mut blurred = Gray::zeros((height, width));
    for ((y, x), out) in blurred.indexed_iter_mut() {
        let v: f64 = kernel
            .iter()
            .enumerate()
            .map(|(k, w)| w * rows[[clamp(y as isize + k as isize - half, height), x]])
            .sum();
        *out = v.round().clamp(0.0, 255.0) as u8;
    }
    blurred
}

/// The gray level that best splits `image` into two classes.
pub fn otsu_threshold(image: &Gray) -> u8 {
    let mut histogram = [0u64; 256];
    for &pixel in image.iter() {
        histogram[pixel as usize] += 1;
    }
    let total_pixels = image.len() as f64;

    let sum: f64 = histogram
        .iter()
        .enumerate()
        .map(|(i, &count)| i as f64 * count as f64)
        .sum();

    let mut sum_b = 0.0;
    let mut weight_b = 0.0;
    let mut max_variance = 0.0;
    let mut threshold = 0u8;

    for (i, &count) in histogram.iter().enumerate() {
        weight_b += count as f64;
        if weight_b == 0.0 {
            continue;
        }
        let weight_f = total_pixels - weight_b;
        if weight_f == 0.0 {
            break;
        }

        sum_b += i as f64 * count as f64;
        let mean_b = sum_b / weight_b;
        let mean_f = (sum - sum_b) / weight_f;
        let variance = weight_b * weight_f * (mean_b - mean_f).powi(2);

        if variance > max_variance {
            max_variance = variance;
            threshold = i as u8;
        }
    }
    threshold
}

/// Pixels strictly above `level`.
pub fn threshold(image: &Gray, level: u8) -> Mask {
    image.mapv(|p| p > level)
}

fn integral(image: &Gray) -> Array2<u64> {
    let (height, width) = image.dim();
    let mut table = Array2::<u64>::zeros((height + 1, width + 1));
    for y in 0..height {
        let mut row = 0u64;
        for x in 0..width {
            row += image[[y, x]] as u64;
            table[[y + 1, x + 1]] = table[[y, x + 1]] + row;
        }
    }
    table
}

/// Mark pixels that differ from the mean of the `block` square around them
/// by more than `offset`, in the direction of `polarity`. Blocks are clipped
/// at the image edges.
pub fn adaptive_threshold(image: &Gray, block: usize, offset: f64, polarity: Polarity) -> Mask {
    let (height, width) = image.dim();
    let table = integral(image);
    let half = (block | 1) / 2;

    let mut mask = Mask::from_elem((height, width), false);
    for ((y, x), out) in mask.indexed_iter_mut() {
        let (y0, y1) = (y.saturating_sub(half), (y + half + 1).min(height));
        let (x0, x1) = (x.saturating_sub(half), (x + half + 1).min(width));
        let sum = table[[y1, x1]] + table[[y0, x0]] - table[[y0, x1]] - table[[y1, x0]];
        let mean = sum as f64 / ((y1 - y0) * (x1 - x0)) as f64;
        let pixel = image[[y, x]] as f64;
        *out = match polarity {
            Polarity::Bright => pixel > mean + offset,
            Polarity::Dark => pixel < mean - offset,
        };
    }
    mask
}

/// Square morphology, done as a row pass then a column pass. `any` selects
/// dilation, otherwise erosion. Pixels outside the image are ignored.
fn morph(mask: &Mask, radius: usize, any: bool) -> Mask {
    let (height, width) = mask.dim();
    let pass = |src: &Mask, horizontal: bool| {
        let mut out = Mask::from_elem((height, width), false);
        for ((y, x), v) in out.indexed_iter_mut() {
            let (lo, hi, len) = if horizontal {
                (x.saturating_sub(radius), x + radius, width)
            } else {
                (y.saturating_sub(radius), y + radius, height)
            };
            let mut window = (lo..=hi.min(len - 1)).map(|i| {
                if horizontal {
                    src[[y, i]]
                } else {
                    src[[i, x]]
                }
            });
            *v = if any {
                window.any(|p| p)
            } else {
                window.all(|p| p)
            };
        }
        out
    };
    if height == 0 || width == 0 || radius == 0 {
        return mask.clone();
    }
    pass(&pass(mask, true), false)
}

pub fn dilate(mask: &Mask, radius: usize) -> Mask {
    morph(mask, radius, true)
}

pub fn erode(mask: &Mask, radius: usize) -> Mask {
    morph(mask, radius, false)
}

/// Dilate then erode `iterations` times each, merging fragments of one
/// object that are closer than about `2 * radius * iterations` pixels.
pub fn close(mask: &Mask, radius: usize, iterations: usize) -> Mask {
    let mut out = mask.clone();
    for _ in 0..iterations {
        out = dilate(&out, radius);
    }
    for _ in 0..iterations {
        out = erode(&out, radius);
    }
    out
}

/// Set every background pixel not connected to the image border.
pub fn fill_holes(mask: &Mask) -> Mask {
    let (height, width) = mask.dim();
    let mut outside = Mask::from_elem((height, width), false);
    let mut queue = VecDeque::new();

    for y in 0..height {
        for x in 0..width {
            let border = y == 0 || x == 0 || y + 1 == height || x + 1 == width;
            if border && !mask[[y, x]] {
                outside[[y, x]] = true;
                queue.push_back((y, x));
            }
        }
    }
    while let Some((y, x)) = queue.pop_front() {
        let neighbors = [
            (y.wrapping_sub(1), x),
            (y + 1, x),
            (y, x.wrapping_sub(1)),
            (y, x + 1),
        ];
        for (ny, nx) in neighbors {
            if ny < height && nx < width && !mask[[ny, nx]] && !outside[[ny, nx]] {
                outside[[ny, nx]] = true;
                queue.push_back((ny, nx));
            }
        }
    }
    outside.mapv(|o| !o)
}

fn find_root(parents: &mut [usize], label: usize) -> usize {
    let mut current = label;
    while current != parents[current] {
        parents[current] = parents[parents[current]];
        current = parents[current];
    }
    current
}

fn union_labels(parents: &mut [usize], a: usize, b: usize) {
    let (root_a, root_b) = (find_root(parents, a), find_root(parents, b));
    if root_a < root_b {
        parents[root_b] = root_a;
    } else if root_b < root_a {
        parents[root_a] = root_b;
    }
}

/// Label 8-connected foreground regions 1..=n in raster order of their first
/// pixel. Background is 0. Returns the labels and n.
pub fn connected_components(mask: &Mask) -> (Array2<usize>, usize) {
    let (height, width) = mask.dim();
    let mut labels = Array2::<usize>::zeros((height, width));
    let mut parents = vec![0];

    for y in 0..height {
        for x in 0..width {
            if !mask[[y, x]] {
                continue;
            }
            let mut neighbors = [0usize; 4];
            if x > 0 {
                neighbors[0] = labels[[y, x - 1]];
            }
            if y > 0 {
                neighbors[1] = labels[[y - 1, x]];
                if x > 0 {
                    neighbors[2] = labels[[y - 1, x - 1]];
                }
                if x + 1 < width {
                    neighbors[3] = labels[[y - 1, x + 1]];
                }
            }

            match neighbors.iter().copied().filter(|&l| l > 0).min() {
                None => {
                    let label = parents.len();
                    parents.push(label);
                    labels[[y, x]] = label;
                }
                Some(min_label) => {
                    labels[[y, x]] = min_label;
                    for &n in neighbors.iter().filter(|&&l| l > 0 && l != min_label) {
                        union_labels(&mut parents, min_label, n);
                    }
                }
            }
        }
    }

    let mut relabel = vec![0; parents.len()];
    let mut count = 0;
    for label in 1..parents.len() {
        let root = find_root(&mut parents, label);
        if relabel[root] == 0 {
            count += 1;
            relabel[root] = count;
        }
        relabel[label] = relabel[root];
    }
    labels.mapv_inplace(|l| relabel[l]);
    (labels, count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn mask_from(pattern: &[&[u8]]) -> Mask {
        let height = pattern.len();
        let width = pattern[0].len();
        Mask::from_shape_fn((height, width), |(y, x)| pattern[y][x] == 1)
    }

    #[test]
    fn gray_weights() {
        assert_eq!(rgb_to_gray(255, 255, 255), 255);
        assert_eq!(rgb_to_gray(0, 0, 0), 0);
        assert_eq!(rgb_to_gray(255, 0, 0), 76);
    }

    #[test]
    fn crop_is_clipped() {
        let image = Gray::from_shape_fn((4, 5), |(y, x)| (y * 10 + x) as u8);
        let roi = Roi { x: 3, y: 2, width: 10, height: 10 };
        assert_eq!(crop(&image.view(), &roi), array![[23, 24], [33, 34]]);
    }

    #[test]
    fn average_rounds() {
        let frames: VecDeque<Gray> = [array![[0, 10]], array![[1, 20]]].into_iter().collect();
        assert_eq!(average(&frames).unwrap(), array![[1, 15]]);
        assert!(average(&VecDeque::new()).is_none());
    }

    #[test]
    fn blur_keeps_flat_images_flat() {
        let flat = Gray::from_elem((6, 7), 90);
        assert_eq!(gaussian_blur(&flat, 5), flat);
        let kernel = gaussian_kernel(5);
        assert!((kernel.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert_eq!(kernel.len(), 5);
    }

    #[test]
    fn otsu_splits_bimodal_images() {
        let image = Gray::from_shape_fn((10, 10), |(_, x)| if x < 5 { 30 } else { 200 });
        let level = otsu_threshold(&image);
        assert!((30..200).contains(&level));
        let mask = threshold(&image, level);
        assert_eq!(mask.iter().filter(|&&m| m).count(), 50);
    }

    #[test]
    fn adaptive_threshold_finds_dark_spot() {
        let mut image = Gray::from_elem((21, 21), 200);
        image[[10, 10]] = 40;
        let mask = adaptive_threshold(&image, 11, 20.0, Polarity::Dark);
        assert_eq!(mask.iter().filter(|&&m| m).count(), 1);
        assert!(mask[[10, 10]]);
        let bright = adaptive_threshold(&image, 11, 20.0, Polarity::Bright);
        assert!(bright.iter().all(|&m| !m));
    }

    #[test]
    fn close_merges_split_objects() {
        let split = mask_from(&[
            &[0, 0, 0, 0, 0, 0, 0],
            &[0, 1, 1, 0, 1, 1, 0],
            &[0, 1, 1, 0, 1, 1, 0],
            &[0, 0, 0, 0, 0, 0, 0],
        ]);
        assert_eq!(connected_components(&split).1, 2);
        assert_eq!(connected_components(&close(&split, 1, 1)).1, 1);
        assert!(erode(&dilate(&split, 1), 1)[[1, 3]]);
    }

    #[test]
    fn holes_are_filled() {
        let ring = mask_from(&[
            &[0, 0, 0, 0, 0],
            &[0, 1, 1, 1, 0],
            &[0, 1, 0, 1, 0],
            &[0, 1, 1, 1, 0],
            &[0, 0, 0, 0, 0],
        ]);
        let filled = fill_holes(&ring);
        assert!(filled[[2, 2]]);
        assert!(!filled[[0, 0]]);
        assert_eq!(filled.iter().filter(|&&m| m).count(), 9);
    }

    #[test]
    fn components_use_eight_connectivity() {
        let mask = mask_from(&[
            &[1, 0, 0, 0, 1],
            &[0, 1, 0, 1, 0],
            &[0, 0, 1, 0, 0],
            &[0, 0, 0, 0, 0],
            &[1, 1, 0, 0, 1],
        ]);
        let (labels, count) = connected_components(&mask);
        assert_eq!(count, 3);
        assert_eq!(labels[[0, 0]], 1);
        assert_eq!(labels[[0, 4]], 1);
        assert_eq!(labels[[4, 0]], 2);
        assert_eq!(labels[[4, 4]], 3);
    }
}
