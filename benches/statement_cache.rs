//! Criterion comparison of single-row lookups through a `Handle` whose statements
//! come from the shared cache versus re-preparing the statement on every call.
//! Both variants hit the same seeded on-disk dataset.

use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use sql_handle::prelude::*;
use sql_handle::sqlite::SqlitePool;
use tokio::runtime::Runtime;

const LOOKUP_SQL: &str = "SELECT id, name FROM test WHERE id = ?1";

// Dedicated runtime for the async handle path.
static TOKIO_RUNTIME: LazyLock<Runtime> =
    LazyLock::new(|| Runtime::new().expect("create tokio runtime"));

/// Resolve how many lookups each iteration should perform.
fn lookup_count() -> i64 {
    std::env::var("BENCH_LOOKUPS")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(500)
}

fn setup_manager(rows: i64) -> Arc<Manager<SqlitePool>> {
    let path = std::env::temp_dir().join("sql_handle_statement_cache_bench.db");
    let _ = std::fs::remove_file(&path);
    TOKIO_RUNTIME.block_on(async {
        let pool = SqlitePool::builder(path.to_string_lossy().into_owned())
            .build()
            .await
            .expect("create sqlite pool");
        pool.execute_batch("CREATE TABLE test (id INTEGER PRIMARY KEY, name TEXT NOT NULL);")
            .await
            .expect("create table");
        let manager = Manager::new(pool, Arc::new(NopLogger));
        let mut h = manager.new_handle();
        h.begin().await.expect("begin");
        for id in 1..=rows {
            h.exec(
                "INSERT INTO test (id, name) VALUES (?1, ?2)",
                &[id.into(), format!("name-{id}").into()],
            )
            .await
            .expect("seed row");
        }
        h.commit().await.expect("commit");
        manager
    })
}

fn bench_lookups(c: &mut Criterion) {
    let rows = lookup_count();
    let manager = setup_manager(rows);
    let mut group = c.benchmark_group("statement_cache");

    group.bench_function(BenchmarkId::new("cached", rows), |b| {
        b.iter_custom(|iters| {
            let mut total = Duration::default();
            for _ in 0..iters {
                let start = Instant::now();
                TOKIO_RUNTIME.block_on(async {
                    let mut h = manager.new_handle();
                    for id in 1..=rows {
                        let row: (i64, String) = h
                            .query_row(LOOKUP_SQL, &[id.into()])
                            .await
                            .scan()
                            .expect("lookup");
                        black_box(row);
                    }
                });
                total += start.elapsed();
            }
            total
        });
    });

    group.bench_function(BenchmarkId::new("prepare_each_call", rows), |b| {
        b.iter_custom(|iters| {
            let mut total = Duration::default();
            for _ in 0..iters {
                let start = Instant::now();
                TOKIO_RUNTIME.block_on(async {
                    let h = manager.new_handle();
                    for id in 1..=rows {
                        let stmt = h.prepare(LOOKUP_SQL).await.expect("prepare");
                        let rs = stmt.query(&[id.into()]).await.expect("lookup");
                        black_box(rs);
                    }
                });
                total += start.elapsed();
            }
            total
        });
    });

    group.finish();
}

criterion_group!(benches, bench_lookups);
criterion_main!(benches);
