//! Signal processing - cycle detection on encoder readings

mod history;
mod interpolation;
mod signal_processor;

pub use history::ReadingHistory;
pub use interpolation::{quadratic_peak, Sample};
pub use signal_processor::{MissingHistory, SignalProcessor};
