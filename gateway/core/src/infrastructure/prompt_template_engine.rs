// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Prompt Template Engine
//!
//! Renders oracle user prompts with Handlebars placeholder substitution.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Transform templates with placeholders into final prompts
//! - **Integration:** application/prompts.rs → LLMProvider input
//!
//! # Supported Placeholders
//!
//! - `{{tenant}}` - Tenant id (also the policy package prefix)
//! - `{{schema}}` - Tenant schema description
//! - `{{request}}` - Natural-language request text
//! - `{{user_record}}` - Serialized user record
//! - `{{history}}` - Serialized conversation history
//! - `{{allowed_columns}}` / `{{row_constraints}}` - Verdict parts for rewriting
//! - `{{rules}}` - Natural-language policy rules
//! - `{{sample_user}}` - First user-table row
//! - `{{draft}}` / `{{failures}}` - Current draft and failure report for repair
//!
//! HTML escaping is disabled: prompts are plain text and routinely contain
//! quotes, angle brackets and JSON.

use anyhow::{Context, Result};
use handlebars::Handlebars;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ============================================================================
// Template Context
// ============================================================================

/// Context data for prompt template rendering
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_record: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_columns: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_constraints: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_user: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failures: Option<String>,

    /// Additional custom fields
    #[serde(flatten)]
    pub extras: HashMap<String, serde_json::Value>,
}

impl PromptContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn request(mut self, request: impl Into<String>) -> Self {
        self.request = Some(request.into());
        self
    }

    pub fn user_record(mut self, record: impl Into<String>) -> Self {
        self.user_record = Some(record.into());
        self
    }

    pub fn history(mut self, history: impl Into<String>) -> Self {
        self.history = Some(history.into());
        self
    }

    pub fn allowed_columns(mut self, columns: impl Into<String>) -> Self {
        self.allowed_columns = Some(columns.into());
        self
    }

    pub fn row_constraints(mut self, constraints: impl Into<String>) -> Self {
        self.row_constraints = Some(constraints.into());
        self
    }

    pub fn rules(mut self, rules: impl Into<String>) -> Self {
        self.rules = Some(rules.into());
        self
    }

    pub fn sample_user(mut self, sample: impl Into<String>) -> Self {
        self.sample_user = Some(sample.into());
        self
    }

    pub fn draft(mut self, draft: impl Into<String>) -> Self {
        self.draft = Some(draft.into());
        self
    }

    pub fn failures(mut self, failures: impl Into<String>) -> Self {
        self.failures = Some(failures.into());
        self
    }

    /// Add extra field
    pub fn extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extras.insert(key.into(), value);
        self
    }
}

// ============================================================================
// Template Engine
// ============================================================================

pub struct PromptTemplateEngine {
    handlebars: Handlebars<'static>,
}

impl PromptTemplateEngine {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(false); // missing variables render empty
        handlebars.register_escape_fn(handlebars::no_escape);
        Self { handlebars }
    }

    /// Compile and store a named template for repeated rendering
    pub fn register(&mut self, name: &str, template: &str) -> Result<()> {
        self.handlebars
            .register_template_string(name, template)
            .with_context(|| format!("Invalid prompt template '{}'", name))
    }

    /// Render a previously registered template
    pub fn render_named(&self, name: &str, context: &PromptContext) -> Result<String> {
        self.handlebars
            .render(name, context)
            .with_context(|| format!("Failed to render prompt template '{}'", name))
    }

    /// Render an ad-hoc template string
    pub fn render(&self, template: &str, context: &PromptContext) -> Result<String> {
        self.handlebars
            .render_template(template, context)
            .context("Failed to render prompt template")
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.handlebars.has_template(name)
    }

    /// Validate template syntax without rendering
    pub fn validate_template(&self, template: &str) -> Result<()> {
        handlebars::template::Template::compile(template)
            .map(|_| ())
            .context("Invalid Handlebars template syntax")
    }
}

impl Default for PromptTemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_rendering() {
        let engine = PromptTemplateEngine::new();
        let context = PromptContext::new()
            .schema("CREATE TABLE employees (id int);")
            .request("show salaries");

        let result = engine
            .render("Schema:\n{{schema}}\nRequest: \"{{request}}\"", &context)
            .unwrap();

        assert_eq!(result, "Schema:\nCREATE TABLE employees (id int);\nRequest: \"show salaries\"");
    }

    #[test]
    fn test_values_are_not_escaped_or_reinterpreted() {
        let engine = PromptTemplateEngine::new();
        let context = PromptContext::new()
            .user_record(r#"{"user_id": "u1", "note": "<b>&"}"#)
            .request("orders since {{LAST_MONTH_START}}");

        let result = engine.render("{{user_record}} | {{request}}", &context).unwrap();
        assert_eq!(
            result,
            r#"{"user_id": "u1", "note": "<b>&"} | orders since {{LAST_MONTH_START}}"#
        );
    }

    #[test]
    fn test_missing_variables() {
        let engine = PromptTemplateEngine::new();
        let context = PromptContext::new().rules("managers see everything");

        let result = engine.render("Rules: {{rules}}\nDraft: {{draft}}", &context).unwrap();
        assert_eq!(result, "Rules: managers see everything\nDraft: ");
    }

    #[test]
    fn test_named_templates() {
        let mut engine = PromptTemplateEngine::new();
        engine.register("repair", "Fix {{draft}} given {{failures}}").unwrap();
        assert!(engine.has_template("repair"));

        let context = PromptContext::new().draft("package x").failures("Case 'a' failed");
        let result = engine.render_named("repair", &context).unwrap();
        assert_eq!(result, "Fix package x given Case 'a' failed");

        assert!(engine.render_named("missing", &context).is_err());
    }

    #[test]
    fn test_conditional_rendering() {
        let engine = PromptTemplateEngine::new();
        let template = "{{#if history}}History: {{history}}{{else}}History: none{{/if}}";

        let with = PromptContext::new().history("[]");
        assert_eq!(engine.render(template, &with).unwrap(), "History: []");
        assert_eq!(engine.render(template, &PromptContext::new()).unwrap(), "History: none");
    }

    #[test]
    fn test_validate_template() {
        let engine = PromptTemplateEngine::new();
        assert!(engine.validate_template("{{request}}").is_ok());
        assert!(engine.validate_template("{{request").is_err());
    }

    #[test]
    fn test_extra_fields() {
        let engine = PromptTemplateEngine::new();
        let context = PromptContext::new().extra("attempt", serde_json::json!(3));
        assert_eq!(engine.render("Attempt {{attempt}}", &context).unwrap(), "Attempt 3");
    }
}
