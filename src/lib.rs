//! Dubmerge - merge dubbed audio tracks into video containers
//!
//! This library crate exposes the core functionality for integration testing.

pub mod config;
pub mod jobs;
