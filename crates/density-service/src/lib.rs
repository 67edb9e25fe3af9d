pub mod alert;
pub mod api;
pub mod config;
pub mod density;
pub mod detector;
pub mod error;
pub mod frame;
pub mod pipeline;
pub mod state;

pub use config::DensityServiceConfig;
pub use pipeline::{DensityPipeline, DetectParams};
pub use state::DensityServiceState;
