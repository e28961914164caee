//! Image decoding and normalization.
//!
use clap::ValueEnum;
use image::{imageops::FilterType, RgbImage};
use ndarray::{Array3, Array4, Axis};

use crate::{error::PredictError, landmarks::LandmarkSet};

/// Default model input edge length.
pub const IMAGE_SIZE: u32 = 64;

/// Channel order the classifier was trained with.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum ChannelOrder {
    #[default]
    Rgb,
    Bgr,
}

impl ChannelOrder {
    /// Source channel of the RGB pixel for output channel `c`.
    fn source_channel(&self, c: usize) -> usize {
        match self {
            ChannelOrder::Rgb => c,
            ChannelOrder::Bgr => 2 - c,
        }
    }
}

/// Decode uploaded bytes into an RGB image.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, PredictError> {
    let image = image::load_from_memory(bytes)?;
    Ok(image.to_rgb8())
}

/// `H x W x 3` float image with values in `[0, 1]`.
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedImageTensor(Array3<f32>);

impl NormalizedImageTensor {
    /// Zero-valued placeholder for requests without an image.
    pub fn zeros(width: u32, height: u32) -> Self {
        Self(Array3::zeros((height as usize, width as usize, 3)))
    }

    pub fn shape(&self) -> &[usize] {
        self.0.shape()
    }

    pub fn array(&self) -> &Array3<f32> {
        &self.0
    }

    /// Prepend the batch axis: `1 x H x W x 3`.
    pub fn into_batched(self) -> Array4<f32> {
        self.0.insert_axis(Axis(0))
    }
}

/// Resizes images to the model input size and scales them to `[0, 1]`.
///
/// The resize is direct (no crop, no letterbox); the aspect ratio is not
/// preserved.
#[derive(Clone, Copy, Debug)]
pub struct ImagePreprocessor {
    width: u32,
    height: u32,
    channel_order: ChannelOrder,
}

impl ImagePreprocessor {
    pub fn new(width: u32, height: u32, channel_order: ChannelOrder) -> Self {
        Self {
            width,
            height,
            channel_order,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn process(&self, image: &RgbImage) -> NormalizedImageTensor {
        let resized: RgbImage =
            image::imageops::resize(image, self.width, self.height, FilterType::Triangle);

        let tensor = Array3::from_shape_fn(
            (self.height as usize, self.width as usize, 3),
            |(y, x, c)| {
                resized[(x as _, y as _)][self.channel_order.source_channel(c)] as f32 / 255.0
            },
        );

        NormalizedImageTensor(tensor)
    }
}

impl Default for ImagePreprocessor {
    fn default() -> Self {
        Self::new(IMAGE_SIZE, IMAGE_SIZE, ChannelOrder::default())
    }
}

/// Cut out the region around a hand.
///
/// The bounding box of the hand keypoints is grown by `margin` pixels on each
/// side and clamped to the image. Returns `None` when the clamped box is
/// empty.
pub fn crop_to_hand(image: &RgbImage, hand: &LandmarkSet, margin: u32) -> Option<RgbImage> {
    let (width, height) = image.dimensions();

    let points: Vec<(f32, f32)> = hand
        .keypoints()
        .iter()
        .filter_map(|kp| kp.to_pixel(width, height))
        .collect();
    if points.is_empty() {
        return None;
    }

    let x_min = points.iter().map(|p| p.0).fold(f32::INFINITY, f32::min);
    let x_max = points.iter().map(|p| p.0).fold(f32::NEG_INFINITY, f32::max);
    let y_min = points.iter().map(|p| p.1).fold(f32::INFINITY, f32::min);
    let y_max = points.iter().map(|p| p.1).fold(f32::NEG_INFINITY, f32::max);

    let margin = margin as f32;
    let clamp_x = |v: f32| v.clamp(0.0, width as f32) as u32;
    let clamp_y = |v: f32| v.clamp(0.0, height as f32) as u32;
    let (left, right) = (clamp_x(x_min - margin), clamp_x(x_max + margin));
    let (top, bottom) = (clamp_y(y_min - margin), clamp_y(y_max + margin));

    if right <= left || bottom <= top {
        return None;
    }

    let crop = image::imageops::crop_imm(image, left, top, right - left, bottom - top);
    Some(crop.to_image())
}

#[cfg(test)]
mod test {

    use image::Rgb;

    use super::*;
    use crate::landmarks::Keypoint;

    #[test]
    fn test_output_shape_and_range() {
        let preprocessor = ImagePreprocessor::default();

        for (width, height) in [(640, 480), (17, 93), (64, 64), (1, 1)] {
            let image = RgbImage::from_fn(width, height, |x, y| {
                Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
            });
            let tensor = preprocessor.process(&image);

            assert_eq!(tensor.shape(), &[64, 64, 3]);
            assert!(tensor.array().iter().all(|v| (0.0..=1.0).contains(v)));
        }
    }

    #[test]
    fn test_values_are_scaled_by_255() {
        let image = RgbImage::from_pixel(64, 64, Rgb([255, 0, 51]));
        let tensor = ImagePreprocessor::default().process(&image);

        // Resampling may round a uniform value down by one step
        let step = 1.0 / 255.0 + 1e-6;
        assert!((tensor.array()[[10, 10, 0]] - 1.0).abs() <= step);
        assert_eq!(tensor.array()[[10, 10, 1]], 0.0);
        assert!((tensor.array()[[10, 10, 2]] - 0.2).abs() <= step);
    }

    #[test]
    fn test_bgr_order_swaps_channels() {
        let image = RgbImage::from_pixel(8, 8, Rgb([255, 0, 0]));
        let tensor = ImagePreprocessor::new(4, 4, ChannelOrder::Bgr).process(&image);

        assert_eq!(tensor.array()[[0, 0, 0]], 0.0);
        assert!(tensor.array()[[0, 0, 2]] > 0.99);
    }

    #[test]
    fn test_configured_size_is_used() {
        let tensor = ImagePreprocessor::new(32, 16, ChannelOrder::Rgb).process(&RgbImage::new(5, 5));
        assert_eq!(tensor.shape(), &[16, 32, 3]);
        assert_eq!(tensor.into_batched().shape(), &[1, 16, 32, 3]);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let result = decode_image(b"definitely not an image");
        assert!(matches!(result, Err(PredictError::ImageDecode(_))));
    }

    #[test]
    fn test_crop_to_hand_with_margin() {
        let image = RgbImage::new(100, 100);
        let hand = LandmarkSet::new(vec![Keypoint::new(0.2, 0.3, 0.0), Keypoint::new(0.4, 0.6, 0.0)]);

        let crop = crop_to_hand(&image, &hand, 5).unwrap();
        assert_eq!(crop.dimensions(), (30, 40));

        let crop = crop_to_hand(&image, &hand, 50).unwrap();
        assert_eq!(crop.dimensions(), (90, 100));
    }

    #[test]
    fn test_crop_to_degenerate_hand_is_none() {
        let image = RgbImage::new(100, 100);
        let hand = LandmarkSet::new(vec![Keypoint::new(0.5, 0.5, 0.0); 21]);

        assert!(crop_to_hand(&image, &hand, 0).is_none());
        assert!(crop_to_hand(&image, &LandmarkSet::default(), 10).is_none());

        let outside = LandmarkSet::new(vec![Keypoint::new(1.5, 1.5, 0.0), Keypoint::new(2.0, 2.0, 0.0)]);
        assert!(crop_to_hand(&image, &outside, 0).is_none());
    }
}
