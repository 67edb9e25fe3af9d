//! Density computation and the two-threshold status ladder.

use common::density::{DensityStatus, DENSITY_UNIT};

/// Floor applied to the configured area so a zero or negative area never divides by zero
pub const MIN_AREA_M2: f64 = 1e-6;

/// People per square meter for `person_count` people over `roi_area_m2`
pub fn compute_density(person_count: u32, roi_area_m2: f64) -> f64 {
    person_count as f64 / roi_area_m2.max(MIN_AREA_M2)
}

/// Classify `density`, most severe level first.
///
/// Both thresholds are inclusive lower bounds. The thresholds are not checked
/// against each other: with `warn > danger`, anything at or above `danger` is
/// still reported as danger.
pub fn classify(density: f64, warn_threshold: f64, danger_threshold: f64) -> DensityStatus {
    if density >= danger_threshold {
        DensityStatus::Danger
    } else if density >= warn_threshold {
        DensityStatus::Warning
    } else {
        DensityStatus::Normal
    }
}

/// Human-readable message for a classified density
pub fn status_message(status: DensityStatus, density: f64) -> String {
    match status {
        DensityStatus::Danger => format!(
            "Danger! Density reached {:.2} {}, evacuate the area immediately",
            density, DENSITY_UNIT
        ),
        DensityStatus::Warning => format!(
            "Warning! Density reached {:.2} {}, consider restricting entry",
            density, DENSITY_UNIT
        ),
        DensityStatus::Normal => {
            format!("Normal. Current density {:.2} {}", density, DENSITY_UNIT)
        }
    }
}

/// Round to 2 decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
