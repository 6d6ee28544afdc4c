pub mod config;
pub mod extraction;
pub mod models;
pub mod notify;
pub mod plugins;
pub mod resilience;
pub mod rules;
pub mod scheduler;
pub mod storage;
pub mod tracker;
pub mod utils;

// Re-export commonly used types
pub use config::AppConfig;
pub use tracker::{TrackSummary, Tracker};
pub use utils::error::{AppError, Result};
