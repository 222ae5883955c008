//! In-memory pool client used by the protocol tests.
//!
//! Records every statement per physical connection, simulates session
//! variables the way `set_config`/`current_setting` behave, and keeps the
//! session map of a returned connection intact so tests can observe exactly
//! what the next checkout would see.
//!
//! Statement markers:
//! - `pg_sleep` — hold the connection ~40ms before executing
//! - `error_now` — the statement (or stream setup) fails
//! - `error_mid_stream` — stream setup succeeds, the stream errors after one row

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use regex_lite::Regex;

use palisade_core::client::{ClientConnection, PoolClient, RowStream};
use palisade_core::error::DriverError;
use palisade_core::value::SqlValue;

/// Session variables the default `SessionConfig` writes.
pub const TENANT_VAR: &str = "settings.tenant_id";
pub const ACTOR_VAR: &str = "settings.actor_id";

/// One logged wire operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Op {
    pub conn: usize,
    pub sql: String,
}

/// A row of the simulated `posts` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockRow {
    pub tenant_id: String,
    pub actor_id: String,
    pub title: String,
}

pub fn row(tenant: &str, actor: &str, title: &str) -> MockRow {
    MockRow {
        tenant_id: tenant.to_string(),
        actor_id: actor.to_string(),
        title: title.to_string(),
    }
}

pub fn is_set(sql: &str) -> bool {
    sql.contains("set_config") && !is_reset(sql)
}

pub fn is_reset(sql: &str) -> bool {
    sql.contains("set_config") && sql.contains("'', false")
}

pub fn is_control(sql: &str) -> bool {
    matches!(sql, "BEGIN" | "COMMIT" | "ROLLBACK")
}

struct Shared {
    semaphore: Arc<tokio::sync::Semaphore>,
    idle: Mutex<Vec<ConnState>>,
    log: Mutex<Vec<Op>>,
    table: Mutex<Vec<MockRow>>,
    next_id: AtomicUsize,
    discarded: AtomicUsize,
    fail_next_set: AtomicBool,
    fail_next_reset: AtomicBool,
}

struct ConnState {
    id: usize,
    session: HashMap<String, String>,
}

/// A bounded pool of recorded in-memory connections.
#[derive(Clone)]
pub struct MockPool {
    shared: Arc<Shared>,
}

impl MockPool {
    pub fn new(size: usize) -> Self {
        Self::with_rows(size, Vec::new())
    }

    pub fn with_rows(size: usize, rows: Vec<MockRow>) -> Self {
        Self {
            shared: Arc::new(Shared {
                semaphore: Arc::new(tokio::sync::Semaphore::new(size)),
                idle: Mutex::new(Vec::new()),
                log: Mutex::new(Vec::new()),
                table: Mutex::new(rows),
                next_id: AtomicUsize::new(0),
                discarded: AtomicUsize::new(0),
                fail_next_set: AtomicBool::new(false),
                fail_next_reset: AtomicBool::new(false),
            }),
        }
    }

    /// Snapshot of every operation in wire order.
    pub fn ops(&self) -> Vec<Op> {
        self.shared.log.lock().unwrap().clone()
    }

    /// Operations observed on one physical connection, in order.
    pub fn ops_for(&self, conn: usize) -> Vec<String> {
        self.ops()
            .into_iter()
            .filter(|op| op.conn == conn)
            .map(|op| op.sql)
            .collect()
    }

    /// Distinct physical connections that saw traffic.
    pub fn conns_used(&self) -> Vec<usize> {
        let mut ids: Vec<usize> = self.ops().into_iter().map(|op| op.conn).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    pub fn clear_ops(&self) {
        self.shared.log.lock().unwrap().clear();
    }

    pub fn discarded(&self) -> usize {
        self.shared.discarded.load(Ordering::SeqCst)
    }

    /// Make the next context-set round trip fail.
    pub fn fail_next_set(&self) {
        self.shared.fail_next_set.store(true, Ordering::SeqCst);
    }

    /// Make the next context-reset round trip fail.
    pub fn fail_next_reset(&self) {
        self.shared.fail_next_reset.store(true, Ordering::SeqCst);
    }

    /// Session maps of connections currently sitting idle in the pool.
    pub fn idle_sessions(&self) -> Vec<(usize, HashMap<String, String>)> {
        self.shared
            .idle
            .lock()
            .unwrap()
            .iter()
            .map(|c| (c.id, c.session.clone()))
            .collect()
    }
}

#[async_trait]
impl PoolClient for MockPool {
    type Connection = MockConnection;

    async fn acquire(&self) -> Result<MockConnection, DriverError> {
        let permit = self
            .shared
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("mock pool semaphore closed");

        let state = self.shared.idle.lock().unwrap().pop().unwrap_or_else(|| ConnState {
            id: self.shared.next_id.fetch_add(1, Ordering::SeqCst),
            session: HashMap::new(),
        });

        Ok(MockConnection {
            state: Some(state),
            shared: self.shared.clone(),
            _permit: permit,
        })
    }
}

/// One simulated physical connection, exclusively checked out.
pub struct MockConnection {
    state: Option<ConnState>,
    shared: Arc<Shared>,
    _permit: tokio::sync::OwnedSemaphorePermit,
}

impl MockConnection {
    fn state_mut(&mut self) -> &mut ConnState {
        self.state.as_mut().expect("connection used after discard")
    }

    /// Execute one statement against the simulated session/table.
    async fn run(&mut self, sql: &str) -> Result<Vec<MockRow>, DriverError> {
        if sql.contains("pg_sleep") {
            tokio::time::sleep(Duration::from_millis(40)).await;
        }

        let conn_id = self.state_mut().id;
        self.shared.log.lock().unwrap().push(Op {
            conn: conn_id,
            sql: sql.to_string(),
        });

        if sql.contains("set_config") {
            if is_reset(sql) && self.shared.fail_next_reset.swap(false, Ordering::SeqCst) {
                return Err(DriverError::msg("simulated reset failure"));
            }
            if is_set(sql) && self.shared.fail_next_set.swap(false, Ordering::SeqCst) {
                return Err(DriverError::msg("simulated set failure"));
            }

            let re = Regex::new(r"set_config\('([^']*)', '([^']*)', false\)").unwrap();
            for caps in re.captures_iter(sql) {
                let var = caps.get(1).unwrap().as_str().to_string();
                let value = caps.get(2).unwrap().as_str().to_string();
                self.state_mut().session.insert(var, value);
            }
            return Ok(Vec::new());
        }

        if is_control(sql) {
            return Ok(Vec::new());
        }

        if sql.contains("error_now") {
            return Err(DriverError::msg("simulated statement failure"));
        }

        if sql.contains("current_setting") {
            let re = Regex::new(r"current_setting\('([^']*)', true\)").unwrap();
            let values: Vec<String> = re
                .captures_iter(sql)
                .map(|caps| {
                    let var = caps.get(1).unwrap().as_str();
                    self.state_mut().session.get(var).cloned().unwrap_or_default()
                })
                .collect();
            return Ok(vec![MockRow {
                tenant_id: values.first().cloned().unwrap_or_default(),
                actor_id: values.get(1).cloned().unwrap_or_default(),
                title: "current_setting".to_string(),
            }]);
        }

        if sql.contains("from posts") {
            let tenant = self
                .state_mut()
                .session
                .get(TENANT_VAR)
                .cloned()
                .unwrap_or_default();
            let rows = self
                .shared
                .table
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.tenant_id == tenant)
                .cloned()
                .collect();
            return Ok(rows);
        }

        Ok(Vec::new())
    }
}

#[async_trait]
impl ClientConnection for MockConnection {
    type Row = MockRow;

    async fn query(&mut self, sql: &str, _params: &[SqlValue]) -> Result<Vec<MockRow>, DriverError> {
        self.run(sql).await
    }

    async fn execute(&mut self, sql: &str, _params: &[SqlValue]) -> Result<u64, DriverError> {
        self.run(sql).await.map(|rows| rows.len() as u64)
    }

    async fn batch_execute(&mut self, sql: &str) -> Result<(), DriverError> {
        self.run(sql).await.map(|_| ())
    }

    async fn query_stream(
        &mut self,
        sql: &str,
        _params: &[SqlValue],
    ) -> Result<RowStream<MockRow>, DriverError> {
        let rows = self.run(sql).await?;

        let mut items: Vec<Result<MockRow, DriverError>> = Vec::new();
        if sql.contains("error_mid_stream") {
            items.extend(rows.into_iter().take(1).map(Ok));
            items.push(Err(DriverError::msg("simulated stream failure")));
        } else {
            items.extend(rows.into_iter().map(Ok));
        }

        Ok(futures::stream::iter(items).boxed())
    }

    fn discard(mut self) {
        self.state = None;
        self.shared.discarded.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        // A clean return keeps the session map as-is: the next checkout sees
        // exactly what the previous holder left behind.
        if let Some(state) = self.state.take() {
            self.shared.idle.lock().unwrap().push(state);
        }
    }
}
