// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Oracle Provider Infrastructure - Anti-Corruption Layer Implementations
//
// Each adapter translates between the domain CompletionRequest and an
// external chat/completion API. The registry resolves the configured alias
// and owns retry and fallback.

pub mod ollama;
pub mod openai;
pub mod registry;

pub use registry::ProviderRegistry;
