//! Phase runner for stdcap. Loads YAML test files and runs each case's setup, call, and
//! teardown phases under per-test output capture.

pub mod args;
pub mod config;
pub mod events;
mod execution;
pub mod reporting;
pub mod runner;
pub mod testcase;
mod trace_categories;

pub use runner::{RunResults, TestRunner};
