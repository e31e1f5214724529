// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Application
//!
//! Use cases built on the domain ports: request mediation, policy
//! synthesis and administration, plus the tenant cache and write
//! coordination they share.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Orchestrates domain types over the oracle, evaluator and
//!   artifact store ports

pub mod admin;
pub mod bounded;
pub mod cache;
pub mod gateway;
pub mod mediation;
pub mod prompts;
pub mod reply_parser;
pub mod synthesis;
pub mod write_coordinator;

pub use admin::{AdminError, PolicyAdminService, PolicyUpdateReport};
pub use cache::TenantCache;
pub use gateway::QueryGate;
pub use mediation::{MediationService, MediationSettings};
pub use synthesis::{PolicySynthesizer, SynthesisSettings};
pub use write_coordinator::WriteCoordinator;
