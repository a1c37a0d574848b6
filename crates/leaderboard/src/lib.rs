pub mod aggregator;
pub mod builder;
pub mod cli;
pub mod metrics;
pub mod play;
pub mod reconciler;
pub mod resolver;
pub mod scheduler;
pub mod scoring;
pub mod session;
pub mod sources;
