//! Test utilities for the workload generator.
//!
//! This crate provides request handlers with observable behavior, helpers to declare request
//! graphs tersely, and logging setup for the test runner. See the modules for all available
//! utilities.

pub mod graph;
pub mod handlers;
pub mod tracing;
