//! Integration tests for domreel
//!
//! These tests drive the recorder and the replayer together through the
//! in-memory page and the headless surface.

#[path = "../common/mod.rs"]
pub mod common;

pub mod capture_flow;
pub mod path_props;
pub mod privacy_flow;
pub mod replay_flow;
