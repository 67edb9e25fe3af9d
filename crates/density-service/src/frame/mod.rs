pub mod normalize;
pub mod roi;

pub use normalize::normalize;
pub use roi::{extract_roi, RoiBounds, RoiCrop, RoiPercent};
