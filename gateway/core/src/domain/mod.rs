// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Domain types and ports shared by the mediation pipeline and the
//! synthesis loop.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Tenant, user, intent, verdict and synthesis types plus the oracle, evaluator and store ports

pub mod tenant;
pub mod user;
pub mod intent;
pub mod verdict;
pub mod llm;
pub mod evaluator;
pub mod store;
pub mod synthesis;
pub mod gateway_config;
