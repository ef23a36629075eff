pub mod models;
pub mod pool;
pub mod services;

pub use pool::{init_pool, run_migrations};
