//! Common test utilities and infrastructure
//!
//! Shared fixtures and a builder that assembles a `Nexus` run against
//! mocked collaborators.

#![allow(dead_code)]

pub mod fixtures;
pub mod helpers;

pub use fixtures::TestFixtures;
pub use helpers::{NexusBuilder, TestHelpers};
