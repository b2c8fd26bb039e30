pub mod cache;
pub mod monitor;
pub mod periodic;
pub mod summary;
pub mod sweeper;

pub use monitor::AnomalyMonitor;
pub use summary::StatisticsService;
pub use sweeper::RetentionSweeper;
