//! Row-level security policy DDL for provisioning tenant isolation.
//!
//! The runtime protocol only maintains session variables; the policies below
//! are what make the database enforce them. Generation lives here so the
//! policy predicates and the session variables they read stay defined in one
//! place.

use std::fmt::Write;

use palisade_core::SessionConfig;

/// SQL cast applied to `current_setting(...)` in policy predicates, matching
/// the tenant/actor column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolicyCast {
    /// Text columns.
    #[default]
    Text,
    /// Integer columns.
    Int4,
    /// UUID columns.
    Uuid,
}

impl PolicyCast {
    fn as_sql(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Int4 => "int4",
            Self::Uuid => "uuid",
        }
    }
}

/// A table covered by tenant isolation.
#[derive(Debug, Clone)]
struct PolicyTable {
    name: String,
    tenant_column: String,
    /// Set for tables whose rows additionally belong to one actor.
    actor_column: Option<String>,
}

/// Tenant-isolation policies for a set of tables.
///
/// Every policy reads the same session variables the runtime protocol
/// writes: rows are visible when the tenant column matches the tenant
/// variable, and, for actor-owned tables, when the actor column matches the
/// actor variable as well.
#[derive(Debug, Clone)]
pub struct PolicySet {
    session: SessionConfig,
    tables: Vec<PolicyTable>,
    cast: PolicyCast,
    policy_prefix: String,
}

impl PolicySet {
    /// Create a policy set bound to the given session variables.
    pub fn new(session: SessionConfig) -> Self {
        Self {
            session,
            tables: Vec::new(),
            cast: PolicyCast::default(),
            policy_prefix: "tenant_isolation".to_string(),
        }
    }

    /// Set the cast applied to session variables in predicates.
    pub fn cast(mut self, cast: PolicyCast) -> Self {
        self.cast = cast;
        self
    }

    /// Set the policy name prefix.
    pub fn policy_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.policy_prefix = prefix.into();
        self
    }

    /// Cover a table whose rows belong to a tenant.
    pub fn add_table(mut self, table: impl Into<String>, tenant_column: impl Into<String>) -> Self {
        self.tables.push(PolicyTable {
            name: table.into(),
            tenant_column: tenant_column.into(),
            actor_column: None,
        });
        self
    }

    /// Cover a table whose rows belong to a tenant and a single actor.
    pub fn add_owned_table(
        mut self,
        table: impl Into<String>,
        tenant_column: impl Into<String>,
        actor_column: impl Into<String>,
    ) -> Self {
        self.tables.push(PolicyTable {
            name: table.into(),
            tenant_column: tenant_column.into(),
            actor_column: Some(actor_column.into()),
        });
        self
    }

    /// SQL enabling row level security on a table.
    pub fn enable_rls_sql(&self, table: &str) -> String {
        format!("ALTER TABLE {} ENABLE ROW LEVEL SECURITY;", quote_ident(table))
    }

    /// SQL forcing row level security even for the table owner.
    pub fn force_rls_sql(&self, table: &str) -> String {
        format!("ALTER TABLE {} FORCE ROW LEVEL SECURITY;", quote_ident(table))
    }

    fn predicate(&self, table: &PolicyTable) -> String {
        let mut predicate = format!(
            "{} = current_setting('{}')::{}",
            quote_ident(&table.tenant_column),
            self.session.tenant_variable,
            self.cast.as_sql(),
        );
        if let Some(ref actor_column) = table.actor_column {
            write!(
                predicate,
                " AND {} = current_setting('{}')::{}",
                quote_ident(actor_column),
                self.session.actor_variable,
                self.cast.as_sql(),
            )
            .unwrap();
        }
        predicate
    }

    fn policy_name(&self, table: &str) -> String {
        format!("{}_{}", self.policy_prefix, table)
    }

    /// SQL creating the isolation policy for one covered table.
    fn create_policy_sql(&self, table: &PolicyTable) -> String {
        let predicate = self.predicate(table);
        format!(
            "CREATE POLICY {} ON {}\n    FOR ALL\n    USING ({})\n    WITH CHECK ({});",
            quote_ident(&self.policy_name(&table.name)),
            quote_ident(&table.name),
            predicate,
            predicate,
        )
    }

    /// SQL dropping the isolation policy for a table.
    pub fn drop_policy_sql(&self, table: &str) -> String {
        format!(
            "DROP POLICY IF EXISTS {} ON {};",
            quote_ident(&self.policy_name(table)),
            quote_ident(table)
        )
    }

    /// Complete provisioning script for every covered table.
    pub fn setup_sql(&self) -> String {
        let mut sql = String::with_capacity(2048);

        for table in &self.tables {
            writeln!(sql, "-- Table: {}", table.name).unwrap();
            writeln!(sql, "{}", self.enable_rls_sql(&table.name)).unwrap();
            writeln!(sql, "{}", self.force_rls_sql(&table.name)).unwrap();
            writeln!(sql, "{}", self.drop_policy_sql(&table.name)).unwrap();
            writeln!(sql, "{}", self.create_policy_sql(table)).unwrap();
            writeln!(sql).unwrap();
        }

        sql
    }

    /// Teardown script removing isolation from every covered table.
    pub fn teardown_sql(&self) -> String {
        let mut sql = String::with_capacity(512);

        for table in &self.tables {
            writeln!(sql, "{}", self.drop_policy_sql(&table.name)).unwrap();
            writeln!(
                sql,
                "ALTER TABLE {} DISABLE ROW LEVEL SECURITY;",
                quote_ident(&table.name)
            )
            .unwrap();
        }

        sql
    }
}

/// Quote a PostgreSQL identifier when it needs quoting.
fn quote_ident(name: &str) -> String {
    let plain = !name.is_empty()
        && !name.chars().next().unwrap().is_ascii_digit()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

    if plain {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}
