pub mod performance_store;

pub use performance_store::PerformanceStore;
