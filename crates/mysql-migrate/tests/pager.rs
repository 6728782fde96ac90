//! Key-range paging against an in-memory table: ranges must be ordered,
//! contiguous and disjoint, and reading them must reproduce the table.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{composite_key_table, heap_table, int, policy, single_key_table, FakeSource, FakeTable, Predicate};
use futures::TryStreamExt;
use mysql_migrate::core::ReadCommand;
use mysql_migrate::dialect::{lexicographic, Bound};
use mysql_migrate::filter::{ColumnSkipRules, RowLimits, TableFilter};
use mysql_migrate::resilience::Realm;
use mysql_migrate::source::{BatchReader, CommandGenerator, KeyRangePager, Probe};
use tokio_util::sync::CancellationToken;

async fn commands(source: &Arc<FakeSource>, table: &str, limit: Option<u64>, batch: u64) -> Vec<ReadCommand> {
    let pager = KeyRangePager::new(source.clone(), policy(Realm::Source));
    let schema = Arc::new(source.table(table).schema.clone());
    let cancel = CancellationToken::new();
    pager
        .commands(schema, limit, batch, &cancel)
        .try_collect()
        .await
        .unwrap()
}

async fn read_keys(source: &Arc<FakeSource>, commands: &[ReadCommand], width: usize) -> Vec<Vec<i64>> {
    let reader = BatchReader::new(
        source.clone(),
        policy(Realm::Source),
        Arc::new(ColumnSkipRules::new(Vec::new()).unwrap()),
    );
    let cancel = CancellationToken::new();
    let mut keys = Vec::new();
    for command in commands {
        let batch = reader.read(&cancel, command).await.unwrap();
        keys.extend(batch.rows.iter().map(|row| row[..width].iter().map(int).collect::<Vec<_>>()));
    }
    keys
}

fn sorted_keys(table: &FakeTable) -> Vec<Vec<i64>> {
    table.rows.iter().map(|row| table.key(row)).collect()
}

fn as_ints(key: &Option<Vec<mysql_migrate::SqlValue>>) -> Option<Vec<i64>> {
    key.as_ref().map(|k| k.iter().map(int).collect())
}

#[tokio::test]
async fn test_ranges_cover_table_in_order() {
    let tables = vec![single_key_table("orders", 97, 2), composite_key_table("items", 9, 4)];
    let source = Arc::new(FakeSource::new(tables));

    for (table, width) in [("orders", 1), ("items", 2)] {
        let all = sorted_keys(source.table(table));
        for batch in [1, 2, 7, 36, 97, 500] {
            for limit in [None, Some(0), Some(1), Some(35), Some(36), Some(1000)] {
                let commands = commands(&source, table, limit, batch).await;

                // Contiguous: each range starts where the previous one ended.
                for pair in commands.windows(2) {
                    assert_eq!(
                        as_ints(&pair[0].to_key),
                        as_ints(&pair[1].from_key),
                        "{table} batch={batch} limit={limit:?}"
                    );
                }
                if let Some(first) = commands.first() {
                    assert_eq!(as_ints(&first.from_key), Some(all[0].clone()));
                }

                let expected_rows = limit.map_or(all.len(), |l| (l as usize).min(all.len()));
                let keys = read_keys(&source, &commands, width).await;
                assert_eq!(keys, all[..expected_rows].to_vec(), "{table} batch={batch} limit={limit:?}");

                if expected_rows == all.len() && !commands.is_empty() {
                    assert!(commands.last().unwrap().to_key.is_none() || limit.is_some());
                }
            }
        }
    }
}

#[test]
fn test_key_predicates_follow_tuple_order() {
    let columns = ["a", "b", "c"];
    let params = ["x0", "x1", "x2"];
    let values = [1i64, 2, 3];

    for width in 1..=3 {
        let lower = Predicate::parse(&lexicographic(&columns[..width], &params[..width], Bound::Lower).unwrap());
        let upper = Predicate::parse(&lexicographic(&columns[..width], &params[..width], Bound::Upper).unwrap());

        let tuples: Vec<Vec<i64>> = (0..values.len().pow(width as u32))
            .map(|mut n| {
                (0..width)
                    .map(|_| {
                        let v = values[n % values.len()];
                        n /= values.len();
                        v
                    })
                    .collect()
            })
            .collect();

        for row in &tuples {
            for bound in &tuples {
                let column = |name: &str| row[columns.iter().position(|c| *c == name).unwrap()];
                let param = |name: &str| bound[params.iter().position(|p| *p == name).unwrap()];
                assert_eq!(lower.eval(&column, &param), row >= bound, "{row:?} >= {bound:?}");
                assert_eq!(upper.eval(&column, &param), row < bound, "{row:?} < {bound:?}");
            }
        }
    }
}

#[tokio::test]
async fn test_probe_outcomes() {
    let source = Arc::new(FakeSource::new(vec![single_key_table("orders", 5, 1)]));
    let pager = KeyRangePager::new(source.clone(), policy(Realm::Source));
    let schema = source.table("orders").schema.clone();
    let cancel = CancellationToken::new();

    let first = pager.probe(&cancel, &schema, 3, None).await.unwrap();
    assert_eq!(
        first,
        Probe::Range(vec![mysql_migrate::SqlValue::Int(1)], vec![mysql_migrate::SqlValue::Int(4)])
    );

    let from = [mysql_migrate::SqlValue::Int(4)];
    let last = pager.probe(&cancel, &schema, 3, Some(&from)).await.unwrap();
    assert_eq!(last, Probe::Last(vec![mysql_migrate::SqlValue::Int(4)]));

    let past_end = [mysql_migrate::SqlValue::Int(99)];
    let exhausted = pager.probe(&cancel, &schema, 3, Some(&past_end)).await.unwrap();
    assert_eq!(exhausted, Probe::Exhausted);

    // One statement for the first step, one for every later step.
    assert_eq!(pager.cached_statements(), 2);
}

#[tokio::test]
async fn test_empty_table_yields_no_commands() {
    let source = Arc::new(FakeSource::new(vec![single_key_table("orders", 0, 1)]));
    assert!(commands(&source, "orders", None, 10).await.is_empty());
}

#[tokio::test]
async fn test_heap_table_is_read_whole() {
    let source = Arc::new(FakeSource::new(vec![heap_table("audit_log", 12)]));
    let commands = commands(&source, "audit_log", Some(5), 2).await;

    assert_eq!(commands.len(), 1);
    assert!(commands[0].from_key.is_none() && commands[0].to_key.is_none());
    assert_eq!(source.probes.load(Ordering::SeqCst), 0);
    assert_eq!(read_keys(&source, &commands, 2).await.len(), 12);
}

#[tokio::test]
async fn test_generator_walks_tables_in_catalog_order() {
    let tables = vec![
        single_key_table("orders", 10, 1),
        single_key_table("order_archive", 10, 1),
        heap_table("audit_log", 3),
    ];
    let source = Arc::new(FakeSource::new(tables));
    let generator = CommandGenerator::new(
        source.clone(),
        policy(Realm::Source),
        TableFilter::new(&[], &["archive".to_string()]).unwrap(),
        RowLimits::new(None, Vec::new()).unwrap(),
        4,
    );
    let cancel = CancellationToken::new();

    let tables = generator.discover(&cancel).await.unwrap();
    let names: Vec<&str> = tables.iter().map(|t| t.name()).collect();
    assert_eq!(names, vec!["orders", "audit_log"]);

    let commands: Vec<ReadCommand> = generator.commands(tables, &cancel).try_collect().await.unwrap();
    let per_table: Vec<&str> = commands.iter().map(|c| c.table_name()).collect();
    assert_eq!(per_table, vec!["orders", "orders", "orders", "audit_log"]);
}

#[tokio::test]
async fn test_cancelled_pager_stops() {
    let source = Arc::new(FakeSource::new(vec![single_key_table("orders", 100, 1)]));
    let pager = KeyRangePager::new(source.clone(), policy(Realm::Source));
    let schema = Arc::new(source.table("orders").schema.clone());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result: Result<Vec<ReadCommand>, _> = pager.commands(schema, None, 10, &cancel).try_collect().await;
    assert!(matches!(result, Err(mysql_migrate::MigrateError::Cancelled)));
    assert_eq!(source.probes.load(Ordering::SeqCst), 0);
}
