//! Set/execute/reset protocol properties for one-off statements.

mod support;

use std::collections::HashMap;

use pretty_assertions::assert_eq;

use palisade_core::client::PoolClient;
use palisade_core::{Error, SessionConfig, TenantContext, VirtualConnection};

use support::{is_reset, is_set, row, MockPool, ACTOR_VAR, TENANT_VAR};

fn tenant_one(pool: &MockPool) -> VirtualConnection<MockPool> {
    VirtualConnection::new(pool.clone(), TenantContext::new(1_i64, 10_i64))
}

#[tokio::test]
async fn statement_runs_as_set_execute_reset_on_one_lease() {
    let pool = MockPool::with_rows(4, vec![row("1", "10", "first")]);
    let conn = tenant_one(&pool);

    let rows = conn.query("select * from posts", &[]).await.unwrap();
    assert_eq!(rows.len(), 1);

    let conns = pool.conns_used();
    assert_eq!(conns.len(), 1, "one statement uses exactly one lease");

    let ops = pool.ops_for(conns[0]);
    assert_eq!(ops.len(), 3);
    assert!(is_set(&ops[0]));
    assert_eq!(ops[1], "select * from posts");
    assert!(is_reset(&ops[2]));
}

#[tokio::test]
async fn set_statement_carries_both_identifiers() {
    let pool = MockPool::new(1);
    let conn = tenant_one(&pool);

    conn.query("select * from posts", &[]).await.unwrap();

    let ops = pool.ops();
    assert!(ops[0].sql.contains("set_config('settings.tenant_id', '1', false)"));
    assert!(ops[0].sql.contains("set_config('settings.actor_id', '10', false)"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_statements_get_one_pair_each() {
    const N: usize = 20;

    let pool = MockPool::with_rows(4, vec![row("1", "10", "first")]);
    let conn = tenant_one(&pool);

    let mut tasks = Vec::new();
    for _ in 0..N {
        let conn = conn.clone();
        tasks.push(tokio::spawn(async move {
            conn.query("select * from posts", &[]).await.unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let ops = pool.ops();
    let sets = ops.iter().filter(|op| is_set(&op.sql)).count();
    let resets = ops.iter().filter(|op| is_reset(&op.sql)).count();
    assert_eq!(sets, N, "exactly one context-set per statement");
    assert_eq!(resets, N, "exactly one context-reset per statement");

    // On every physical connection the traffic is whole, uninterleaved
    // [set, statement, reset] triples.
    for conn_id in pool.conns_used() {
        let per_conn = pool.ops_for(conn_id);
        assert_eq!(per_conn.len() % 3, 0);
        for triple in per_conn.chunks(3) {
            assert!(is_set(&triple[0]));
            assert_eq!(triple[1], "select * from posts");
            assert!(is_reset(&triple[2]));
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_tenants_on_a_pool_of_one_never_leak() {
    let pool = MockPool::with_rows(
        1,
        vec![
            row("1", "10", "t1-a"),
            row("1", "10", "t1-b"),
            row("2", "20", "t2-a"),
        ],
    );

    let fast = VirtualConnection::new(pool.clone(), TenantContext::new(1_i64, 10_i64));
    let slow = VirtualConnection::new(pool.clone(), TenantContext::new(2_i64, 20_i64));

    // The slow tenant holds the single physical connection longer and
    // resolves later; both must still see only their own rows.
    let (fast_rows, slow_rows) = tokio::join!(
        async {
            let fast = fast.clone();
            tokio::spawn(async move { fast.query("select * from posts", &[]).await.unwrap() })
                .await
                .unwrap()
        },
        async {
            let slow = slow.clone();
            tokio::spawn(async move {
                slow.query("select * from posts /* pg_sleep */", &[])
                    .await
                    .unwrap()
            })
            .await
            .unwrap()
        },
    );

    assert_eq!(fast_rows.len(), 2);
    for r in &fast_rows {
        assert_eq!((r.tenant_id.as_str(), r.actor_id.as_str()), ("1", "10"));
    }

    assert_eq!(slow_rows.len(), 1);
    for r in &slow_rows {
        assert_eq!((r.tenant_id.as_str(), r.actor_id.as_str()), ("2", "20"));
    }
}

#[tokio::test]
async fn statement_error_still_resets_and_returns_lease() {
    let pool = MockPool::new(2);
    let conn = tenant_one(&pool);

    let err = conn.query("select error_now", &[]).await.unwrap_err();
    assert!(matches!(err, Error::Statement(_)));

    let conns = pool.conns_used();
    let ops = pool.ops_for(conns[0]);
    assert_eq!(ops.len(), 3);
    assert!(is_set(&ops[0]));
    assert!(is_reset(&ops[2]), "reset runs even when the statement failed");

    assert_eq!(pool.discarded(), 0, "lease went back to the pool cleanly");
}

#[tokio::test]
async fn context_set_failure_aborts_before_the_statement() {
    let pool = MockPool::new(2);
    let conn = tenant_one(&pool);

    pool.fail_next_set();
    let err = conn.query("select * from posts", &[]).await.unwrap_err();
    assert!(matches!(err, Error::ContextSet(_)));

    let ops = pool.ops();
    assert_eq!(ops.len(), 1, "the caller's statement never reached the wire");
    assert!(is_set(&ops[0].sql));

    assert_eq!(pool.discarded(), 1, "a lease with unknown state is not reused");
}

#[tokio::test]
async fn reset_failure_keeps_the_primary_result() {
    let pool = MockPool::with_rows(2, vec![row("1", "10", "first")]);
    let conn = tenant_one(&pool);

    pool.fail_next_reset();
    let rows = conn.query("select * from posts", &[]).await.unwrap();
    assert_eq!(rows.len(), 1, "reset failure must not mask the statement outcome");

    assert_eq!(pool.discarded(), 1, "the unreset lease is discarded, not recycled");

    // The pool stays serviceable afterwards.
    let rows = conn.query("select * from posts", &[]).await.unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn released_lease_carries_no_context_for_the_next_caller() {
    let pool = MockPool::with_rows(1, vec![row("1", "10", "first")]);
    let conn = tenant_one(&pool);

    conn.query("select * from posts", &[]).await.unwrap();

    // Check out the same physical connection directly, the way an unrelated
    // caller outside this layer would, and read the session variables back.
    let mut raw = pool.acquire().await.unwrap();
    let session = SessionConfig::default();
    let observed = palisade_core::client::ClientConnection::query(
        &mut raw,
        &session.current_sql(),
        &[],
    )
    .await
    .unwrap();

    assert_eq!(observed[0].tenant_id, "", "tenant variable is empty after release");
    assert_eq!(observed[0].actor_id, "", "actor variable is empty after release");
}

#[tokio::test]
async fn idle_connections_hold_only_baseline_state() {
    let pool = MockPool::with_rows(2, vec![row("1", "10", "first")]);
    let conn = tenant_one(&pool);

    conn.query("select * from posts", &[]).await.unwrap();
    conn.execute("select * from posts", &[]).await.unwrap();

    let mut seen = HashMap::new();
    for (id, session) in pool.idle_sessions() {
        seen.insert(id, session.clone());
        assert_eq!(session.get(TENANT_VAR).map(String::as_str), Some(""));
        assert_eq!(session.get(ACTOR_VAR).map(String::as_str), Some(""));
    }
    assert!(!seen.is_empty());
}

#[tokio::test]
async fn close_is_refused_on_a_virtual_connection() {
    let pool = MockPool::new(1);
    let conn = tenant_one(&pool);

    assert!(matches!(conn.close(), Err(Error::VirtualClose)));
    assert!(matches!(conn.destroy(), Err(Error::VirtualClose)));

    // The pool is untouched and still serves statements.
    conn.query("select * from posts", &[]).await.unwrap();
}
