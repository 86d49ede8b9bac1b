pub mod sweeper;

pub use sweeper::SweepScheduler;
