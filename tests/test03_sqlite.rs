#![cfg(feature = "sqlite")]

use std::sync::Arc;

use sql_handle::prelude::*;
use sql_handle::sqlite::SqlitePool;
use sql_handle::test_utils::RecordingLogger;
use tempfile::tempdir;

fn unique_db_path(prefix: &str) -> String {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join(format!("{prefix}.db"));
    // Leak the tempdir so the file persists for the duration of the test binary.
    std::mem::forget(dir);
    path.to_string_lossy().into_owned()
}

async fn manager_with_schema(
    prefix: &str,
) -> Result<Arc<Manager<SqlitePool>>, Box<dyn std::error::Error>> {
    let pool = SqlitePool::builder(unique_db_path(prefix))
        .max_size(4)
        .build()
        .await?;
    pool.execute_batch(
        "CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT NOT NULL, qty INTEGER NOT NULL);",
    )
    .await?;
    Ok(Manager::new(pool, Arc::new(NopLogger)))
}

async fn count_items(h: &mut Handle<SqlitePool>) -> SqlHandleResult<i64> {
    let (count,): (i64,) = h.query_row("SELECT COUNT(*) FROM items", &[]).await.scan()?;
    Ok(count)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sqlite_nested_scenario_commits_everything() -> Result<(), Box<dyn std::error::Error>> {
    let manager = manager_with_schema("nested").await?;
    let mut h = manager.new_handle();

    h.begin().await?;
    h.exec(
        "INSERT INTO items (id, name, qty) VALUES (?1, ?2, ?3)",
        &[RowValues::Int(1), "apple".into(), RowValues::Int(3)],
    )
    .await?;
    h.quasi_begin().await?;
    h.exec("UPDATE items SET qty = ?1 WHERE id = ?2", &[10.into(), 1.into()]).await?;
    h.quasi_commit_or_rollback(&Ok::<(), SqlHandleError>(())).await?;
    h.commit().await?;
    assert_eq!(h.state(), HandleState::Idle);

    let (name, qty): (String, i64) = h
        .query_row("SELECT name, qty FROM items WHERE id = ?1", &[1.into()])
        .await
        .scan()?;
    assert_eq!((name.as_str(), qty), ("apple", 10));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sqlite_savepoint_rollback_discards_inner_work() -> Result<(), Box<dyn std::error::Error>> {
    let manager = manager_with_schema("sp_rollback").await?;
    let mut h = manager.new_handle();
    let insert = "INSERT INTO items (id, name, qty) VALUES (?1, ?2, ?3)";

    h.quasi_begin().await?;
    h.exec(insert, &[1.into(), "kept".into(), 1.into()]).await?;

    h.quasi_begin().await?;
    h.exec(insert, &[2.into(), "dropped".into(), 1.into()]).await?;
    // Primary key violation inside the inner unit.
    let outcome = h.exec(insert, &[1.into(), "dupe".into(), 1.into()]).await;
    assert!(matches!(outcome, Err(SqlHandleError::ExecutionFailed { .. })));
    h.quasi_commit_or_rollback(&outcome).await?;
    assert_eq!(h.savepoint_depth(), 0);

    assert_eq!(count_items(&mut h).await?, 1);
    h.quasi_commit().await?;

    let mut other = manager.new_handle();
    assert_eq!(count_items(&mut other).await?, 1);
    let (name,): (String,) = other
        .query_row("SELECT name FROM items", &[])
        .await
        .scan()?;
    assert_eq!(name, "kept");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sqlite_rollback_discards_transaction() -> Result<(), Box<dyn std::error::Error>> {
    let manager = manager_with_schema("rollback").await?;
    let mut h = manager.new_handle();

    h.begin().await?;
    h.exec(
        "INSERT INTO items (id, name, qty) VALUES (?1, ?2, ?3)",
        &[1.into(), "gone".into(), 1.into()],
    )
    .await?;
    h.rollback().await?;

    assert_eq!(count_items(&mut h).await?, 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sqlite_statements_are_cached_across_handles() -> Result<(), Box<dyn std::error::Error>> {
    let manager = manager_with_schema("cache").await?;
    let mut tasks = Vec::new();
    for i in 0..10_i64 {
        let manager = Arc::clone(&manager);
        tasks.push(tokio::spawn(async move {
            let mut h = manager.new_handle();
            h.query("SELECT id, name FROM items WHERE qty > ?1", &[i.into()])
                .await
                .map(|rs| rs.len())
        }));
    }
    for task in tasks {
        assert_eq!(task.await??, 0);
    }
    assert_eq!(manager.cached_statements(), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sqlite_bad_sql_fails_at_preparation() -> Result<(), Box<dyn std::error::Error>> {
    let manager = manager_with_schema("bad_sql").await?;
    let mut h = manager.new_handle();

    let err = h.exec("INSERT INTO missing_table VALUES (1)", &[]).await.unwrap_err();
    assert!(matches!(err, SqlHandleError::StatementPreparationFailed { .. }));
    assert_eq!(manager.cached_statements(), 0);

    let row = h.query_row("SELEC nothing", &[]).await;
    assert!(matches!(
        row.scan::<(i64,)>(),
        Err(SqlHandleError::StatementPreparationFailed { .. })
    ));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sqlite_values_round_trip_through_scan() -> Result<(), Box<dyn std::error::Error>> {
    let pool = SqlitePool::builder(unique_db_path("values")).build().await?;
    pool.execute_batch("CREATE TABLE v (flag INTEGER, note TEXT, data BLOB, score REAL);")
        .await?;
    let logger = Arc::new(RecordingLogger::new());
    let manager = Manager::new(pool, logger.clone());
    let mut h = manager.new_handle();

    h.exec(
        "INSERT INTO v (flag, note, data, score) VALUES (?1, ?2, ?3, ?4)",
        &[
            true.into(),
            RowValues::Null,
            RowValues::Blob(vec![1, 2, 3]),
            2.5.into(),
        ],
    )
    .await?;
    let (flag, note, data, score): (bool, Option<String>, Vec<u8>, f64) = h
        .query_row("SELECT flag, note, data, score FROM v", &[])
        .await
        .scan()?;
    assert!(flag);
    assert_eq!(note, None);
    assert_eq!(data, vec![1, 2, 3]);
    assert!((score - 2.5).abs() < f64::EPSILON);

    let events = logger.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["args"][2], "<3 bytes>");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sqlite_exec_steps_row_returning_statements() -> Result<(), Box<dyn std::error::Error>> {
    let manager = manager_with_schema("exec_rows").await?;
    let mut h = manager.new_handle();
    let insert = "INSERT INTO items (id, name, qty) VALUES (?1, ?2, ?3)";

    assert_eq!(h.exec("SELECT 1", &[]).await?, 1);
    assert_eq!(h.exec(insert, &[1.into(), "a".into(), 1.into()]).await?, 1);
    assert_eq!(h.exec(insert, &[2.into(), "b".into(), 1.into()]).await?, 1);
    assert_eq!(h.exec("SELECT id FROM items", &[]).await?, 2);

    h.begin().await?;
    assert_eq!(h.exec("SELECT id FROM items WHERE id = ?1", &[2.into()]).await?, 1);
    assert_eq!(h.exec("UPDATE items SET qty = qty + 1 RETURNING id", &[]).await?, 2);
    h.commit().await?;

    let (total,): (i64,) = h.query_row("SELECT SUM(qty) FROM items", &[]).await.scan()?;
    assert_eq!(total, 4);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sqlite_dropped_transaction_rolls_back() -> Result<(), Box<dyn std::error::Error>> {
    let manager = manager_with_schema("dropped").await?;
    {
        let mut h = manager.new_handle();
        h.begin().await?;
        h.exec(
            "INSERT INTO items (id, name, qty) VALUES (?1, ?2, ?3)",
            &[1.into(), "abandoned".into(), 1.into()],
        )
        .await?;
    }
    // Rollback of an abandoned transaction runs on a spawned task.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    let mut h = manager.new_handle();
    assert_eq!(count_items(&mut h).await?, 0);
    Ok(())
}
