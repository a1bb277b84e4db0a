//! Shared test utilities for capture-ingest integration tests.
//!
//! - `TestHarness` isolates each test in its own temp data directory
//! - zip fixtures are built on the fly with the `zip` crate
//! - `StubThumbnailer` stands in for ffmpeg

#![allow(dead_code)]

pub mod harness;

pub use harness::{events_json, StubThumbnailer, TestHarness, WAIT};
