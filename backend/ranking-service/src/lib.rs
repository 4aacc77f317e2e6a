pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod models;
pub mod repository;
pub mod services;
pub mod shutdown;

pub use config::Config;
pub use error::{AppError, Result};
pub use jobs::{Coordination, RankingJob};
pub use repository::{CachedRankingRepository, RankingRepository};
pub use services::{BatchRankingService, LeaderCoordinator, RankingService};
