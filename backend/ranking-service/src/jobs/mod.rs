// ============================================
// Scheduled Jobs
// ============================================
//
// Units of work dispatched by the job scheduler:
// 1. Ranking pass (executor "ranking"), optionally fleet-coordinated
// 2. Ranking cache warm-up (local function, executor "local")
//
// A job row selects its unit of work through its `executor` column; local
// functions are further selected by the row's `name`.

pub mod cache_warmer;
pub mod ranking_job;

pub use cache_warmer::register_cache_warmer;
pub use ranking_job::{Coordination, RankingJob};
