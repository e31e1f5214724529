// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Oracle prompts.
//
// System prompts are static text and are sent verbatim: the time tokens in
// INTENT_SYSTEM (`{{TODAY}}`, `{{AGO_DAY_7}}`, ...) must reach the oracle
// literally and are never passed through the template engine. User prompts
// are Handlebars templates rendered per call.

use anyhow::Result;
use serde_json::Value;

use crate::domain::llm::CompletionRequest;
use crate::domain::tenant::TenantId;
use crate::infrastructure::prompt_template_engine::{PromptContext, PromptTemplateEngine};

/// Schema description used when a tenant has no schema file
pub const DEFAULT_SCHEMA: &str =
    "CREATE TABLE employees (id varchar(100), name varchar(100), salary int, department varchar(50));";

pub const INTENT_SYSTEM: &str = r#"You are an expert SQL query parser. You understand natural language and conversation context, and you convert requests into structured JSON objects that follow an AST (abstract syntax tree) convention.

### Task
Turn the user's natural-language request into structured metadata. An Open Policy Agent (OPA) authorization step consumes your output, so it must be exact.

### Strict parsing rules

1. **AST format (critical)**:
   `conditions` is an object whose keys are `table.column` and whose values are **always lists of operator objects**.
   - Standard form: `"table.column": [{"op": "<operator>", "val": <value>}]`
   - Operator guide:
     - equals / is -> `"="`
     - not equal -> `"!="`
     - greater than / above / after -> `">"` or `">="`
     - less than / below / before -> `"<"` or `"<="`
     - contains / search / fuzzy match -> `"LIKE"` (wrap the value in `%`, e.g. `"%keyword%"`)
     - one of -> `"IN"` (value is an array `["A", "B"]`)

2. **Namespaces**:
   Every field in `columns` and `conditions` must be written as `table.column` (for example `products.price`).
   A bare column name such as `price` is invalid.

3. **Context**:
   - Inherit: when the request refers back to earlier turns ("they", "those"), carry over the earlier filters from the conversation history.
   - Reset: when the request is unrelated to the history, ignore the history.

4. **Self-scoped requests (security)**:
   - Trigger: only when the request **explicitly** uses first-person phrasing such as "my", "mine", "myself", "me" or "I".
   - Action: add the matching constraint from the user record to `conditions`, as `[{"op": "=", "val": "<value>"}]`.
   - Never infer it: without such phrasing, **do not** add any user-scoped filter.

5. **Defaults**:
   - `columns`: when no column is named, use `["*"]`.
   - `query_type`: the action, such as "select", "count", "sum".

6. **Time tokenization (core rule)**:
   Act as a semantic translator. **Never** compute concrete dates yourself. Every time reference becomes one of these tokens:

   * A. Base anchors:
     - yesterday: `{{YESTERDAY}}` | today: `{{TODAY}}` | tomorrow: `{{TOMORROW}}`

   * B. Calendar windows (highest priority):
     For whole calendar months or years **never use AGO**; use start and end anchors with the BETWEEN operator.
     - this month: `val: ["{{CURRENT_MONTH_START}}", "{{CURRENT_MONTH_END}}"]`
     - last month: `val: ["{{LAST_MONTH_START}}", "{{LAST_MONTH_END}}"]`
     - this year: `val: ["{{CURRENT_YEAR_START}}", "{{CURRENT_YEAR_END}}"]`
     - last year: `val: ["{{LAST_YEAR_START}}", "{{LAST_YEAR_END}}"]`
     - same month last year: `val: ["{{LAST_YEAR_SAME_MONTH_START}}", "{{LAST_YEAR_SAME_MONTH_END}}"]`

   * C. Rolling offsets (only for "last N" / "past N" phrasing):
     - last 7 days: `val: ["{{AGO_DAY_7}}", "{{TODAY}} 23:59:59"]`
     - last 3 months: `val: ["{{AGO_MONTH_3}}", "{{TODAY}} 23:59:59"]`

   * D. Intra-day periods, appended to an anchor:
     - early morning: `00:00:00` to `06:00:00`
     - morning: `06:00:00` to `12:00:00`
     - noon: `11:00:00` to `14:00:00`
     - afternoon: `12:00:00` to `18:00:00`
     - evening / tonight: `18:00:00` to `23:59:59`
     - example ("last night"): `val: ["{{YESTERDAY}} 18:00:00", "{{YESTERDAY}} 23:59:59"]`

   * E. Disjoint periods (critical):
     When the request compares non-contiguous periods ("this year and last year", "today and yesterday"):
     1. **Never** merge them into one range.
     2. **Always** emit one separate `BETWEEN` object per period.
     - example ("today and yesterday"):
       `"table.time": [`
          `{"op": "BETWEEN", "val": ["{{YESTERDAY}} 00:00:00", "{{YESTERDAY}} 23:59:59"]},`
          `{"op": "BETWEEN", "val": ["{{TODAY}} 00:00:00", "{{TODAY}} 23:59:59"]}`
       `]`

### Examples

**User**: "Show me the details of my orders" (user id: u_001)
**Output**:
{
  "tables": ["orders"],
  "columns": ["orders.id", "orders.amount", "orders.status", "orders.created_at"],
  "conditions": {
    "orders.customer_id": [{"op": "=", "val": "u_001"}]
  },
  "query_type": "select"
}

**User**: "How many work orders were completed last month?"
**Output**:
{
  "tables": ["work_orders"],
  "columns": ["*"],
  "conditions": {
    "work_orders.status": [{"op": "=", "val": "completed"}],
    "work_orders.processed_at": [
      {"op": "BETWEEN", "val": ["{{LAST_MONTH_START}}", "{{LAST_MONTH_END}}"]}
    ]
  },
  "query_type": "count"
}

**User**: "Alarms mentioning 'server' in the past 24 hours"
**Output**:
{
  "tables": ["alarms"],
  "columns": ["alarms.message", "alarms.timestamp", "alarms.level"],
  "conditions": {
    "alarms.message": [{"op": "LIKE", "val": "%server%"}],
    "alarms.timestamp": [
      {"op": "BETWEEN", "val": ["{{AGO_HOUR_24}}", "{{NOW}}"]}
    ]
  },
  "query_type": "select"
}

**User**: "Are house prices this month higher than in the same month last year?"
**Output**:
{
  "tables": ["house_info"],
  "columns": ["house_info.price"],
  "conditions": {
    "house_info.time": [
      {"op": "BETWEEN", "val": ["{{LAST_YEAR_SAME_MONTH_START}}", "{{LAST_YEAR_SAME_MONTH_END}}"]},
      {"op": "BETWEEN", "val": ["{{CURRENT_MONTH_START}}", "{{CURRENT_MONTH_END}}"]}
    ]
  },
  "query_type": "compare"
}
"#;

const INTENT_USER: &str = r#"Database schema:
{{schema}}

User request: "{{request}}"
User record: {{user_record}} (use only when the request is explicitly self-scoped)
Conversation history: {{#if history}}{{history}}{{else}}none{{/if}}

Return the parse result as JSON with these fields:
- tables: (list) tables involved
- columns: (list) requested columns, each written as table.column
- conditions: (object) filter conditions in AST form
- query_type: (string) action type, e.g. "select", "count", "sum"

Return only the JSON object, without ```json fences or any explanation:
"#;

pub const REWRITE_SYSTEM: &str = r#"You rewrite data requests. The user's original request exceeds their permissions and must be narrowed.

Rewrite rules:
1. Keep only the permitted columns.
2. Add the required row-level filtering (for example, if the row constraint is {"id": "emp001"}, the request becomes one about the record whose id is emp001). When the row constraints are empty, add no row filtering.
3. Start from the user's original wording and keep it a natural-language request.
"#;

const REWRITE_USER: &str = r#"Original request: "{{request}}"
Permitted columns: {{allowed_columns}}
Row constraints: {{row_constraints}}
Column meanings: {{schema}}

Return only the rewritten natural-language request, with no explanation.
"#;

const DRAFT_SYSTEM: &str = r#"You are a senior security policy engineer and an expert in OPA Rego.
Write a Rego policy from the context below. Hard requirements:
1. The package is exactly `{{tenant}}.access`.
2. The policy starts with `import rego.v1`.
3. Deny by default: a request is allowed only when a rule explicitly grants it.
4. Declare a role table enumerating every role the rules mention.
5. Declare the full column universe: every column of every table in the schema, written as table.column.
6. For every role declare an explicit exclusion list of columns it may not read (possibly empty).
7. Expose a single `result` object with the members `allowed` (boolean), `allowed_columns` (list), `row_constraints` (object; `{"deny": true}` marks a denied row scope) and `reason` (string).

Database schema:
{{schema}}

Sample user record:
{{sample_user}}

The evaluator input looks like:
{ "input": { "user": { "user_id": "test_u", "user_role": "...", "attributes": { ... } }, "query_request": { "columns": ["*"] } } }
"#;

const DRAFT_USER: &str = r#"Convert the following natural-language policy into Rego:

{{rules}}

Return only the Rego code."#;

pub const TESTS_SYSTEM: &str = r#"You are a QA engineer. From the SQL schema and the natural-language access policy, write verification test cases.
For every role the policy mentions, cover at least one full access case (ALLOW), one column- or row-restricted case (REWRITE) and one refused case (DENY).

Return a plain JSON array, no markdown:
[
  {
    "description": "what the case checks",
    "user_role": "manager",
    "user_id": "user_123",
    "mock_user_attributes": {"dept_id": 101, "region": "north"},
    "query_columns": ["employees.name", "employees.salary"],
    "expected_decision": "ALLOW"
  }
]
(expected_decision is one of ALLOW, REWRITE, DENY)
"#;

const TESTS_USER: &str = r#"Schema:
{{schema}}

Policy:
{{rules}}

Write the test case JSON:"#;

const REPAIR_SYSTEM: &str = r#"You repair Rego policies. The package must be `{{tenant}}.access` and the policy must keep `import rego.v1`.
Return only the complete repaired Rego code."#;

const REPAIR_USER: &str = r#"The current Rego policy has logic or compilation errors and failed verification.

--- Original requirements ---
{{rules}}

--- Current policy ---
{{draft}}

--- Failure report ---
{{failures}}

Work out why each case failed and rewrite the policy so that all of them pass. Keep the syntax valid."#;

/// Which oracle exchange a completion request belongs to, recognised by its
/// system prompt. Used by the scripted oracle to route canned replies.
#[cfg(any(test, feature = "test-util"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Exchange {
    Intent,
    Rewrite,
    Draft,
    TestCases,
    Repair,
}

#[cfg(any(test, feature = "test-util"))]
impl Exchange {
    pub fn of(request: &CompletionRequest) -> Option<Self> {
        let system = request.system.as_str();
        if system == INTENT_SYSTEM {
            Some(Self::Intent)
        } else if system == REWRITE_SYSTEM {
            Some(Self::Rewrite)
        } else if system == TESTS_SYSTEM {
            Some(Self::TestCases)
        } else if system.starts_with(DRAFT_SYSTEM_HEAD) {
            Some(Self::Draft)
        } else if system.starts_with(REPAIR_SYSTEM_HEAD) {
            Some(Self::Repair)
        } else {
            None
        }
    }
}

#[cfg(any(test, feature = "test-util"))]
const DRAFT_SYSTEM_HEAD: &str = "You are a senior security policy engineer";
#[cfg(any(test, feature = "test-util"))]
const REPAIR_SYSTEM_HEAD: &str = "You repair Rego policies";

/// Built-in deny-all policy for a tenant, used when drafting yields nothing
pub fn deny_all_policy(tenant: &TenantId) -> String {
    format!(
        r#"package {}

import rego.v1

default result := {{
	"allowed": false,
	"allowed_columns": [],
	"row_constraints": {{"deny": true}},
	"reason": "No policy has been compiled for this tenant.",
}}
"#,
        tenant.policy_package()
    )
}

/// Registered prompt templates, one instance shared by all services
pub struct PromptBook {
    engine: PromptTemplateEngine,
}

impl PromptBook {
    pub fn new() -> Result<Self> {
        let mut engine = PromptTemplateEngine::new();
        engine.register("intent", INTENT_USER)?;
        engine.register("rewrite", REWRITE_USER)?;
        engine.register("draft_system", DRAFT_SYSTEM)?;
        engine.register("draft", DRAFT_USER)?;
        engine.register("tests", TESTS_USER)?;
        engine.register("repair_system", REPAIR_SYSTEM)?;
        engine.register("repair", REPAIR_USER)?;
        Ok(Self { engine })
    }

    pub fn intent(
        &self,
        schema: &str,
        request: &str,
        user_record: &Value,
        history: &[Value],
    ) -> Result<CompletionRequest> {
        let mut context = PromptContext::new()
            .schema(schema)
            .request(request)
            .user_record(user_record.to_string());
        if !history.is_empty() {
            context = context.history(Value::Array(history.to_vec()).to_string());
        }
        let user = self.engine.render_named("intent", &context)?;
        Ok(CompletionRequest::new(INTENT_SYSTEM, user, 0.0))
    }

    pub fn rewrite(
        &self,
        schema: &str,
        request: &str,
        allowed_columns: &[String],
        row_constraints: &Value,
        temperature: f32,
    ) -> Result<CompletionRequest> {
        let context = PromptContext::new()
            .schema(schema)
            .request(request)
            .allowed_columns(serde_json::to_string(allowed_columns)?)
            .row_constraints(row_constraints.to_string());
        let user = self.engine.render_named("rewrite", &context)?;
        Ok(CompletionRequest::new(REWRITE_SYSTEM, user, temperature))
    }

    pub fn draft(
        &self,
        tenant: &TenantId,
        schema: &str,
        sample_user: &str,
        rules: &str,
        temperature: f32,
    ) -> Result<CompletionRequest> {
        let context = PromptContext::new()
            .tenant(tenant.as_str())
            .schema(schema)
            .sample_user(sample_user)
            .rules(rules);
        let system = self.engine.render_named("draft_system", &context)?;
        let user = self.engine.render_named("draft", &context)?;
        Ok(CompletionRequest::new(system, user, temperature))
    }

    pub fn test_cases(&self, schema: &str, rules: &str, temperature: f32) -> Result<CompletionRequest> {
        let context = PromptContext::new().schema(schema).rules(rules);
        let user = self.engine.render_named("tests", &context)?;
        Ok(CompletionRequest::new(TESTS_SYSTEM, user, temperature))
    }

    pub fn repair(
        &self,
        tenant: &TenantId,
        rules: &str,
        draft: &str,
        failures: &str,
        temperature: f32,
    ) -> Result<CompletionRequest> {
        let context = PromptContext::new()
            .tenant(tenant.as_str())
            .rules(rules)
            .draft(draft)
            .failures(failures);
        let system = self.engine.render_named("repair_system", &context)?;
        let user = self.engine.render_named("repair", &context)?;
        Ok(CompletionRequest::new(system, user, temperature))
    }
}
