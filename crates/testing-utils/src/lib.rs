//! # Prediction Testing Utils
//!
//! Shared testing utilities for the prediction scheduler workspace:
//! in-memory mocks of every port, a manually driven clock and builders
//! for test data.
//!
//! ```toml
//! [dev-dependencies]
//! prediction-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod clock;
pub mod mocks;

pub use builders::*;
pub use clock::*;
pub use mocks::*;
