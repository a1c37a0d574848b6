pub mod config;
pub mod format;
pub mod observability;
pub mod rpc;
pub mod types;
