//! Session-variable statements for the set/execute/reset protocol.

use serde::{Deserialize, Serialize};

use crate::context::TenantContext;

/// Default session variable holding the tenant ID.
pub const DEFAULT_TENANT_VARIABLE: &str = "settings.tenant_id";

/// Default session variable holding the actor ID.
pub const DEFAULT_ACTOR_VARIABLE: &str = "settings.actor_id";

/// Names of the session variables the database's row-level security policies
/// read, plus the statement shapes that write them.
///
/// Both the set and the reset statement are single round trips covering both
/// variables, issued with `is_local = false` so the values survive for the
/// whole checkout window of a lease (and are explicitly cleared before the
/// lease goes back to the pool). Both statements are idempotent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Variable the policies read the tenant ID from.
    pub tenant_variable: String,
    /// Variable the policies read the actor ID from.
    pub actor_variable: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tenant_variable: DEFAULT_TENANT_VARIABLE.to_string(),
            actor_variable: DEFAULT_ACTOR_VARIABLE.to_string(),
        }
    }
}

impl SessionConfig {
    /// Create a config with custom variable names.
    pub fn new(tenant_variable: impl Into<String>, actor_variable: impl Into<String>) -> Self {
        Self {
            tenant_variable: tenant_variable.into(),
            actor_variable: actor_variable.into(),
        }
    }

    /// Statement binding the context's identifiers to the session.
    pub fn set_sql(&self, context: &TenantContext) -> String {
        format!(
            "select set_config('{}', '{}', false), set_config('{}', '{}', false)",
            self.tenant_variable,
            escape_literal(context.tenant_id.as_str()),
            self.actor_variable,
            escape_literal(context.actor_id.as_str()),
        )
    }

    /// Statement restoring the no-context baseline.
    ///
    /// Clears both variables to the empty string; `current_setting(var, true)`
    /// then reports `''`, which is what the policies treat as "no tenant".
    pub fn reset_sql(&self) -> String {
        format!(
            "select set_config('{}', '', false), set_config('{}', '', false)",
            self.tenant_variable, self.actor_variable,
        )
    }

    /// Statement reading both variables back (missing-ok), for diagnostics.
    pub fn current_sql(&self) -> String {
        format!(
            "select current_setting('{}', true), current_setting('{}', true)",
            self.tenant_variable, self.actor_variable,
        )
    }
}

/// Escape a string literal by doubling single quotes.
fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}
