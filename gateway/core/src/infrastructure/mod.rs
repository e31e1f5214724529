// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod llm;
pub mod opa_client;
pub mod prompt_template_engine;
pub mod storage;
#[cfg(any(test, feature = "test-util"))]
pub mod stubs;

pub use opa_client::OpaClient;
pub use storage::{LocalArtifactStore, MockArtifactStore};
