//! Parameter conversions for tokio-postgres.

use palisade_core::SqlValue;
use tokio_postgres::types::ToSql;

/// Convert one owned value to a boxed PostgreSQL parameter.
pub fn value_to_sql(value: &SqlValue) -> Box<dyn ToSql + Sync + Send> {
    match value {
        SqlValue::Null => Box::new(Option::<String>::None),
        SqlValue::Bool(b) => Box::new(*b),
        SqlValue::Int(i) => Box::new(*i),
        SqlValue::Float(f) => Box::new(*f),
        SqlValue::Text(s) => Box::new(s.clone()),
        SqlValue::Json(j) => Box::new(j.clone()),
        SqlValue::Uuid(u) => Box::new(*u),
        SqlValue::Timestamp(t) => Box::new(*t),
    }
}

/// Convert a parameter slice for a statement execution.
pub fn values_to_params(values: &[SqlValue]) -> Vec<Box<dyn ToSql + Sync + Send>> {
    values.iter().map(value_to_sql).collect()
}
