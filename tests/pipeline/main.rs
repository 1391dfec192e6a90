//! End-to-end tests for the save/load pipeline.
//!
//! These drive a real Coordinator against a temp directory: snapshot,
//! encode, durable write, read, decode, migrate and handoff. Unit tests in
//! each crate cover the pieces in isolation.

#[path = "../common/mod.rs"]
mod common;

mod crash_atomicity;
mod integrity;
mod migration;
mod ordering;
