//! API request handlers

mod clusters;
mod health;
mod metrics;

pub use clusters::*;
pub use health::*;
pub use metrics::*;
