pub mod biomech;
pub mod config;
pub mod dataset;
pub mod error;
pub mod export;
pub mod features;
pub mod gbdt;
pub mod metrics;
pub mod model;
pub mod predict;
pub mod preprocess;
pub mod record;
pub mod split;
pub mod synthetic;
pub mod train;

pub use error::{Result, RiskError};
