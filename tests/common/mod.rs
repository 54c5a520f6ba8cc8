//! Shared test utilities for domreel
//!
//! This module provides common helpers for integration tests:
//! - Recording pages and a recorder on a manual clock
//! - Hand-built session payloads for replay tests

pub mod fixtures;
