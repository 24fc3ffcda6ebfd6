//! Shared fixtures for integration tests.

#![allow(dead_code, unused_imports)]

pub mod harness;

pub use harness::{rules, FaultyStore, Fault, TestHarness};
