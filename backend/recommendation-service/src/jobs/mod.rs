pub mod cache_warmer;

pub use cache_warmer::{run_warm_cycle, start_cache_warmer, WarmCycleReport};
