//! # Registration Testing Utils
//!
//! Shared testing utilities for the registration workspace: data builders,
//! a manual clock, scripted subsystem clients and reprocessors, and
//! collaborators that always fail.
//!
//! ```toml
//! [dev-dependencies]
//! registration-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
