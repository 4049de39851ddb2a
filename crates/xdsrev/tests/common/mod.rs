//! Shared test utilities for xdsrev integration tests.
//!
//! This module provides:
//! - `TestHarness` wiring the controller to in-memory collaborators
//! - Builders for DesiredConfig bundles

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
