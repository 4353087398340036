//! Storage traits consumed by the authorization code flow.
//!
//! This module defines storage interfaces for:
//!
//! - Registered client secrets (read-only lookup)
//! - Redeemed authorization codes (single-use tracking)
//!
//! Durable backends are provided by the host. The in-memory implementations
//! here are suitable for tests and single-process deployments.

pub mod client;
pub mod consumption;

pub use client::{ClientSecretIdentity, InMemorySecurityRepository, SecurityRepository};
pub use consumption::{CodeConsumptionStore, InMemoryCodeConsumptionStore};
