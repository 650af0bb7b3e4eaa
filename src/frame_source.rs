//! Where frames come from.
//!
//! A [`FrameSource`] hands out consecutive [`Frame`]s. `Ok(None)` is the end
//! of the stream; [`LearnMemError::FrameUnavailable`] is a transient failure
//! the tracker retries.

use crate::error::{LearnMemError, Result};
use crate::image_ops::{rgb_to_gray, Gray};

use image::DynamicImage;
use log::{debug, info};
use ndarray::{Array3, Axis};
use std::{
    fs,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

/// Pixel data of one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameImage {
    Gray(Gray),
    /// `[[y, x, channel]]`, channels in RGB order.
    Rgb(Array3<u8>),
}

/// One frame and when it was taken, in seconds from the start of the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub timestamp: f64,
    pub image: FrameImage,
}

impl Frame {
    pub fn gray(timestamp: f64, image: Gray) -> Self {
        Self {
            timestamp,
            image: FrameImage::Gray(image),
        }
    }

    /// The frame as grayscale.
    pub fn to_gray(&self) -> Gray {
        match &self.image {
            FrameImage::Gray(gray) => gray.clone(),
            FrameImage::Rgb(rgb) => rgb
                .lanes(Axis(2))
                .into_iter()
                .map(|px| rgb_to_gray(px[0], px[1], px[2]))
                .collect::<ndarray::Array1<u8>>()
                .into_shape((rgb.dim().0, rgb.dim().1))
                .unwrap_or_else(|_| Gray::zeros((rgb.dim().0, rgb.dim().1))),
        }
    }

    /// `(width, height)`.
    pub fn dimensions(&self) -> (usize, usize) {
        match &self.image {
            FrameImage::Gray(gray) => (gray.dim().1, gray.dim().0),
            FrameImage::Rgb(rgb) => (rgb.dim().1, rgb.dim().0),
        }
    }
}

/// A camera, a recording, or anything else producing frames.
pub trait FrameSource: Send {
    /// The next frame, `Ok(None)` at the end of the stream.
    fn read(&mut self) -> Result<Option<Frame>>;

    /// `(width, height)` of the frames.
    fn dimensions(&self) -> (usize, usize);

    /// Release the source.
    fn close(&mut self) -> Result<()>;
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff", "pgm"];

/// Frames read from the image files of a directory, in file name order.
pub struct ImageSequence {
    files: Vec<PathBuf>,
    next: usize,
    fps: f64,
    dimensions: (usize, usize),
}

impl ImageSequence {
    /// Every image file in `dir`, played back at `fps`.
    pub fn open(dir: impl AsRef<Path>, fps: f64) -> Result<Self> {
        let dir = dir.as_ref();
        let mut files: Vec<PathBuf> = fs::read_dir(dir)
            .map_err(|e| LearnMemError::Configuration(format!("{}: {}", dir.display(), e)))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            })
            .collect();
        files.sort();

        let first = files.first().ok_or_else(|| {
            LearnMemError::Configuration(format!("no images found in {}", dir.display()))
        })?;
        let (width, height) = image::image_dimensions(first)?;
        if !(fps.is_finite() && fps > 0.0) {
            return Err(LearnMemError::Configuration(format!("invalid fps {}", fps)));
        }
        info!(
            "Image sequence: {} frames of {}x{} from {}",
            files.len(),
            width,
            height,
            dir.display()
        );

        Ok(Self {
            files,
            next: 0,
            fps,
            dimensions: (width as usize, height as usize),
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

fn decode(image: DynamicImage) -> FrameImage {
    match image {
        DynamicImage::ImageLuma8(luma) => {
            let (width, height) = luma.dimensions();
            let gray = Gray::from_shape_vec((height as usize, width as usize), luma.into_raw())
                .unwrap_or_else(|_| Gray::zeros((height as usize, width as usize)));
            FrameImage::Gray(gray)
        }
        other => {
            let rgb = other.to_rgb8();
            let (width, height) = rgb.dimensions();
            let shape = (height as usize, width as usize, 3);
            let array = Array3::from_shape_vec(shape, rgb.into_raw())
                .unwrap_or_else(|_| Array3::zeros(shape));
            FrameImage::Rgb(array)
        }
    }
}

impl FrameSource for ImageSequence {
    fn read(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.files.get(self.next) else {
            return Ok(None);
        };
        let index = self.next;
        // a broken file is skipped, not retried forever
        self.next += 1;

        let image = image::open(path).map_err(|e| {
            LearnMemError::FrameUnavailable(format!("{}: {}", path.display(), e))
        })?;
        debug!("Read {}", path.display());
        Ok(Some(Frame {
            timestamp: index as f64 / self.fps,
            image: decode(image),
        }))
    }

    fn dimensions(&self) -> (usize, usize) {
        self.dimensions
    }

    fn close(&mut self) -> Result<()> {
        self.next = self.files.len();
        Ok(())
    }
}

/// Hands out the frames of `inner` no earlier than their timestamps, the way
/// a camera would. The first frame sets time zero.
pub struct Paced<S> {
    inner: S,
    start: Option<Instant>,
}

impl<S: FrameSource> Paced<S> {
    pub fn new(inner: S) -> Self {
        Self { inner, start: None }
    }
}

impl<S: FrameSource> FrameSource for Paced<S> {
    fn read(&mut self) -> Result<Option<Frame>> {
        let frame = self.inner.read()?;
        if let Some(frame) = &frame {
            let start = *self.start.get_or_insert_with(Instant::now);
            if frame.timestamp.is_finite() && frame.timestamp > 0.0 {
                let due = start + Duration::from_secs_f64(frame.timestamp);
                let now = Instant::now();
                if due > now {
                    spin_sleep::sleep(due - now);
                }
            }
        }
        Ok(frame)
    }

    fn dimensions(&self) -> (usize, usize) {
        self.inner.dimensions()
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    #[test]
    fn rgb_frames_are_converted() {
        let mut rgb = Array3::<u8>::zeros((2, 3, 3));
        rgb[[1, 2, 0]] = 255;
        rgb[[0, 0, 1]] = 255;
        let frame = Frame {
            timestamp: 0.0,
            image: FrameImage::Rgb(rgb),
        };
        let gray = frame.to_gray();
        assert_eq!(gray.dim(), (2, 3));
        assert_eq!(gray[[1, 2]], 76);
        assert_eq!(gray[[0, 0]], 150);
        assert_eq!(frame.dimensions(), (3, 2));
    }

    #[test]
    fn plays_a_directory_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        GrayImage::from_pixel(4, 3, Luma([7]))
            .save(dir.path().join("frame_001.png"))
            .unwrap();
        RgbImage::from_pixel(4, 3, Rgb([255, 255, 255]))
            .save(dir.path().join("frame_000.png"))
            .unwrap();
        fs::write(dir.path().join("notes.txt"), "not a frame").unwrap();

        let mut frames = ImageSequence::open(dir.path(), 2.0).unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames.dimensions(), (4, 3));

        let first = frames.read().unwrap().unwrap();
        assert_eq!(first.to_gray()[[0, 0]], 255);
        let second = frames.read().unwrap().unwrap();
        assert_eq!(second.timestamp, 0.5);
        assert_eq!(second.to_gray()[[2, 3]], 7);
        assert!(frames.read().unwrap().is_none());
    }

    #[test]
    fn broken_file_is_a_transient_failure() {
        let dir = tempfile::tempdir().unwrap();
        GrayImage::from_pixel(2, 2, Luma([1]))
            .save(dir.path().join("a.png"))
            .unwrap();
        fs::write(dir.path().join("b.png"), "garbage").unwrap();

        let mut frames = ImageSequence::open(dir.path(), 1.0).unwrap();
        assert!(frames.read().unwrap().is_some());
        assert!(matches!(frames.read(), Err(LearnMemError::FrameUnavailable(_))));
        assert!(frames.read().unwrap().is_none());
    }

    #[test]
    fn empty_directory_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ImageSequence::open(dir.path(), 1.0),
            Err(LearnMemError::Configuration(_))
        ));
    }

    #[test]
    fn paced_frames_wait_for_their_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["0.png", "1.png", "2.png"] {
            GrayImage::from_pixel(2, 2, Luma([1]))
                .save(dir.path().join(name))
                .unwrap();
        }
        let mut frames = Paced::new(ImageSequence::open(dir.path(), 20.0).unwrap());
        let begin = Instant::now();
        while frames.read().unwrap().is_some() {}
        assert!(begin.elapsed() >= Duration::from_millis(100));
        assert_eq!(frames.dimensions(), (2, 2));
    }
}
