//! Attendance core: schedule resolution, classification, batch processing,
//! persistence, downstream propagation and schedule reconciliation.

pub mod change_detector;
pub mod classifier;
pub mod persistence;
pub mod processor;
pub mod propagation;
pub mod resolver;
pub mod run;
