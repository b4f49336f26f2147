pub mod service;

pub use service::{RetrySweeper, RetrySweeperConfig, SweepReport};
