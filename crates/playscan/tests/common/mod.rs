//! Shared test utilities for playscan integration tests.
//!
//! This module provides:
//! - `TestHarness` wiring a runner and service over an in-memory database
//! - Fakes for the blob store, AI backend, OCR engine and page renderer
//! - Fixture builders for PDFs and images

pub mod fakes;
pub mod fixtures;
pub mod harness;

pub use fakes::*;
pub use fixtures::*;
pub use harness::TestHarness;
