// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! QueryGate core
//!
//! Mediates natural-language data-access requests against per-tenant
//! authorization policies and synthesizes those policies from
//! natural-language rules.
//!
//! # Architecture
//!
//! - **domain:** value types and the ports to external collaborators
//!   (oracle, evaluator, artifact store)
//! - **application:** mediation pipeline, synthesis loop, cache, write
//!   coordination and the administrative service
//! - **infrastructure:** HTTP adapters, the local artifact store, prompt
//!   rendering and service wiring

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
