//! Percentage-based region of interest and the crop it produces.

use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// ROI bounds as percentages of image width and height.
///
/// Values outside `0..=100` and reversed bounds are accepted; they are
/// clamped when converted to pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoiPercent {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl Default for RoiPercent {
    fn default() -> Self {
        Self::FULL_FRAME
    }
}

/// Absolute pixel bounds, always `0 <= x0 <= x1 <= width` and `0 <= y0 <= y1 <= height`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoiBounds {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl RoiBounds {
    pub fn width(&self) -> u32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> u32 {
        self.y1 - self.y0
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn covers(&self, width: u32, height: u32) -> bool {
        self.x0 == 0 && self.y0 == 0 && self.x1 == width && self.y1 == height
    }
}

fn scale_clamped(extent: u32, percent: i32) -> u32 {
    let scaled = (extent as f64 * percent as f64 / 100.0).floor();
    scaled.clamp(0.0, extent as f64) as u32
}

impl RoiPercent {
    pub const FULL_FRAME: RoiPercent = RoiPercent {
        x0: 0,
        y0: 0,
        x1: 100,
        y1: 100,
    };

    pub fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Convert to pixel bounds for an image of `width` x `height`.
    ///
    /// Reversed bounds collapse to an empty rectangle anchored at the start edge.
    pub fn to_bounds(&self, width: u32, height: u32) -> RoiBounds {
        let x0 = scale_clamped(width, self.x0);
        let y0 = scale_clamped(height, self.y0);
        let x1 = scale_clamped(width, self.x1).max(x0);
        let y1 = scale_clamped(height, self.y1).max(y0);

        RoiBounds { x0, y0, x1, y1 }
    }
}

/// Image region handed to the detector, plus the bounds it was cut from
#[derive(Debug)]
pub struct RoiCrop<'a> {
    pub image: Cow<'a, RgbImage>,
    pub bounds: RoiBounds,
}

impl RoiCrop<'_> {
    /// True when the crop borrows the source image instead of copying it
    pub fn is_full_frame(&self) -> bool {
        matches!(self.image, Cow::Borrowed(_))
    }
}

/// Cut the ROI out of `image`; a full-frame ROI borrows the image without copying.
pub fn extract_roi(image: &RgbImage, roi: RoiPercent) -> RoiCrop<'_> {
    let (width, height) = image.dimensions();
    let bounds = roi.to_bounds(width, height);

    if bounds.covers(width, height) {
        return RoiCrop {
            image: Cow::Borrowed(image),
            bounds,
        };
    }

    let cropped = image::imageops::crop_imm(
        image,
        bounds.x0,
        bounds.y0,
        bounds.width(),
        bounds.height(),
    )
    .to_image();

    RoiCrop {
        image: Cow::Owned(cropped),
        bounds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn assert_well_formed(bounds: RoiBounds, width: u32, height: u32) {
        assert!(bounds.x0 <= bounds.x1 && bounds.x1 <= width, "{:?}", bounds);
        assert!(bounds.y0 <= bounds.y1 && bounds.y1 <= height, "{:?}", bounds);
    }

    #[test]
    fn test_bounds_from_percentages() {
        let bounds = RoiPercent::new(10, 20, 50, 80).to_bounds(1280, 720);
        assert_eq!(
            bounds,
            RoiBounds {
                x0: 128,
                y0: 144,
                x1: 640,
                y1: 576
            }
        );
    }

    #[test]
    fn test_bounds_floor_fractional_pixels() {
        let bounds = RoiPercent::new(33, 33, 67, 67).to_bounds(101, 101);
        assert_eq!((bounds.x0, bounds.x1), (33, 67));
    }

    #[test]
    fn test_bounds_clamp_out_of_range() {
        let bounds = RoiPercent::new(-20, -5, 150, 400).to_bounds(640, 480);
        assert_eq!(
            bounds,
            RoiBounds {
                x0: 0,
                y0: 0,
                x1: 640,
                y1: 480
            }
        );
    }

    #[test]
    fn test_bounds_reversed_collapse_to_empty() {
        let bounds = RoiPercent::new(80, 60, 20, 10).to_bounds(1000, 500);
        assert_well_formed(bounds, 1000, 500);
        assert!(bounds.is_empty());
        assert_eq!(bounds.x0, 800);
        assert_eq!(bounds.y0, 300);
    }

    #[test]
    fn test_bounds_always_well_formed() {
        let samples = [-250, -100, -1, 0, 1, 33, 50, 99, 100, 101, 250];
        for (width, height) in [(0, 0), (1, 1), (7, 3), (1280, 720)] {
            for &x0 in &samples {
                for &x1 in &samples {
                    for &y in &[(-10, 110), (70, 30), (0, 0)] {
                        let bounds = RoiPercent::new(x0, y.0, x1, y.1).to_bounds(width, height);
                        assert_well_formed(bounds, width, height);
                    }
                }
            }
        }
    }

    #[test]
    fn test_full_frame_borrows() {
        let image = RgbImage::new(64, 48);
        let crop = extract_roi(&image, RoiPercent::FULL_FRAME);

        assert!(crop.is_full_frame());
        assert_eq!(crop.bounds.width(), 64);
        assert_eq!(crop.image.dimensions(), (64, 48));
    }

    #[test]
    fn test_oversized_roi_is_full_frame() {
        let image = RgbImage::new(64, 48);
        let crop = extract_roi(&image, RoiPercent::new(-10, 0, 120, 100));
        assert!(crop.is_full_frame());
    }

    #[test]
    fn test_crop_copies_region() {
        let mut image = RgbImage::new(100, 100);
        image.put_pixel(50, 25, Rgb([255, 0, 0]));

        let crop = extract_roi(&image, RoiPercent::new(50, 25, 100, 75));

        assert!(!crop.is_full_frame());
        assert_eq!(crop.image.dimensions(), (50, 50));
        assert_eq!(crop.image.get_pixel(0, 0).0, [255, 0, 0]);
        assert_eq!((crop.bounds.x0, crop.bounds.y0), (50, 25));
    }

    #[test]
    fn test_empty_crop() {
        let image = RgbImage::new(100, 100);
        let crop = extract_roi(&image, RoiPercent::new(60, 10, 40, 90));
        assert!(crop.bounds.is_empty());
        assert_eq!(crop.image.width(), 0);
    }
}
