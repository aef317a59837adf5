//! `mia-core`: building blocks shared by the forecasting stack.
//!
//! This crate contains **pure** primitives (no async runtime, no logging):
//! identifiers, series value objects and the numeric helpers every analysis
//! is written against.

pub mod error;
pub mod id;
pub mod series;
pub mod stats;

pub use error::{CoreError, CoreResult};
pub use id::{ModelKey, StreamId};
pub use series::{DataPoint, TimeSeries, ValueObject};
pub use stats::Regression;
