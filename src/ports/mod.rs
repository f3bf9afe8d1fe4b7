//! Port traits at the boundary between the domain and the outside world.

pub mod config_port;
pub mod data_port;
pub mod feature_cache_port;
pub mod report_port;
pub mod run_store_port;
