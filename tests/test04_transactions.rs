mod common;

use common::{MockProvider, MockScript};
use sql_dbhelper::prelude::*;
#[cfg(feature = "sqlite")]
use tempfile::TempDir;

#[cfg(feature = "sqlite")]
fn ledger_client(prefix: &str) -> Result<(TempDir, DbClient), Box<dyn std::error::Error>> {
    let (dir, path) = common::unique_db_path(prefix);
    let mut client = DbClient::sqlite(format!("Data Source={path}"));
    client.execute_non_query(
        CommandKind::Text,
        "CREATE TABLE ledger (id INTEGER PRIMARY KEY, amount INTEGER NOT NULL)",
        (),
    )?;
    Ok((dir, client))
}

#[cfg(feature = "sqlite")]
fn row_count(client: &mut DbClient) -> Result<RowValues, DbHelperError> {
    client.clear_parameters();
    client.execute_scalar(CommandKind::Text, "SELECT COUNT(*) FROM ledger", ())
}

#[cfg(feature = "sqlite")]
#[test]
fn transacted_batch_is_all_or_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, mut client) = ledger_client("batch_rollback")?;

    let failing = [
        SqlQuery::new(
            "INSERT INTO ledger (id, amount) VALUES (@id, @amount)",
            vec![Parameter::new("id", 1), Parameter::new("amount", 10)],
        ),
        SqlQuery::new(
            "INSERT INTO ledger (id, amount) VALUES (@id, NULL)",
            vec![Parameter::new("id", 2)],
        ),
        SqlQuery::new_without_params("INSERT INTO ledger (id, amount) VALUES (3, 30)"),
    ];
    let err = client
        .execute_transacted_batched_non_query(&failing, None, ())
        .unwrap_err();
    assert!(matches!(err, DbHelperError::SqliteError(_)), "{err:?}");
    assert_eq!(row_count(&mut client)?, RowValues::Int(0));

    let good = [
        SqlQuery::new(
            "INSERT INTO ledger (id, amount) VALUES (?, ?)",
            vec![Parameter::positional(1), Parameter::positional(10)],
        ),
        SqlQuery::new_without_params("INSERT INTO ledger (id, amount) VALUES (2, 20)"),
    ];
    let total =
        client.execute_transacted_batched_non_query(&good, Some(IsolationLevel::Serializable), ())?;
    assert_eq!(total, 2);
    assert_eq!(row_count(&mut client)?, RowValues::Int(2));
    Ok(())
}

#[cfg(feature = "sqlite")]
#[test]
fn plain_batch_keeps_earlier_statements() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, mut client) = ledger_client("batch_plain")?;
    let queries = [
        SqlQuery::new_without_params("INSERT INTO ledger (id, amount) VALUES (1, 10)"),
        SqlQuery::new_without_params("INSERT INTO ledger (id, amount) VALUES (1, 10)"),
        SqlQuery::new_without_params("INSERT INTO ledger (id, amount) VALUES (2, 20)"),
    ];
    assert!(client.execute_batched_non_query(&queries, ()).is_err());
    assert_eq!(row_count(&mut client)?, RowValues::Int(1));
    Ok(())
}

#[cfg(feature = "sqlite")]
#[test]
fn transacted_non_query_rolls_back() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, mut client) = ledger_client("tx_single")?;
    let affected = client.execute_transacted_non_query(
        CommandKind::Text,
        "INSERT INTO ledger (id, amount) VALUES (1, 5); INSERT INTO ledger (id, amount) VALUES (2, 6)",
        None,
        (),
    )?;
    assert_eq!(affected, 2);

    let err = client
        .execute_transacted_non_query(
            CommandKind::Text,
            "INSERT INTO ledger (id, amount) VALUES (3, 7); INSERT INTO ledger (id, amount) VALUES (1, 8)",
            None,
            (),
        )
        .unwrap_err();
    assert!(matches!(err, DbHelperError::SqliteError(_)));
    assert_eq!(row_count(&mut client)?, RowValues::Int(2));
    Ok(())
}

#[cfg(feature = "sqlite")]
#[test]
fn explicit_transactions() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, mut client) = ledger_client("tx_explicit")?;
    let conn = client.get_connection(None)?;

    let tx = client.begin_transaction(&conn, None)?;
    client.execute_non_query(
        CommandKind::Text,
        "INSERT INTO ledger (id, amount) VALUES (1, 1)",
        &tx,
    )?;
    tx.commit()?;

    let tx = client.begin_transaction(&conn, Some(IsolationLevel::ReadUncommitted))?;
    client.execute_non_query(
        CommandKind::Text,
        "INSERT INTO ledger (id, amount) VALUES (2, 2)",
        &tx,
    )?;
    let err = client
        .execute_transacted_non_query(CommandKind::Text, "DELETE FROM ledger", None, &tx)
        .unwrap_err();
    assert!(err.is_config());
    tx.rollback()?;

    assert_eq!(conn.state(), ConnectionState::Open);
    let count = client.execute_scalar(CommandKind::Text, "SELECT COUNT(*) FROM ledger", &conn)?;
    assert_eq!(count, RowValues::Int(1));
    conn.close()?;
    Ok(())
}

#[cfg(feature = "sqlite")]
#[test]
fn abandoned_transaction_rolls_back() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, mut client) = ledger_client("tx_drop")?;
    let conn = client.open_connection(None)?;
    {
        let tx = client.begin_transaction(&conn, None)?;
        client.execute_non_query(
            CommandKind::Text,
            "INSERT INTO ledger (id, amount) VALUES (9, 9)",
            &tx,
        )?;
    }
    let count = client.execute_scalar(CommandKind::Text, "SELECT COUNT(*) FROM ledger", &conn)?;
    assert_eq!(count, RowValues::Int(0));
    Ok(())
}

#[test]
fn failed_rollback_keeps_the_original_error() {
    let provider = MockProvider::new(MockScript {
        fail_on: Some("boom".into()),
        fail_rollback: true,
        ..MockScript::default()
    });
    let mut client = provider.client();
    let err = client
        .execute_transacted_non_query(CommandKind::Text, "UPDATE boom", None, ())
        .unwrap_err();

    match err {
        DbHelperError::RollbackFailed { source, original } => {
            assert!(matches!(*source, DbHelperError::ConnectionError(_)));
            assert!(original.to_string().contains("UPDATE boom"), "{original}");
        }
        other => panic!("expected RollbackFailed, got {other:?}"),
    }
    assert_eq!(provider.log.rollbacks(), 1);
    assert_eq!(provider.log.commits(), 0);
    assert_eq!(provider.log.closes(), 1);
}

#[test]
fn transacted_batch_stops_at_first_failure() {
    let provider = MockProvider::new(MockScript {
        fail_on: Some("second".into()),
        ..MockScript::default()
    });
    let mut client = provider.client();
    let queries = [
        SqlQuery::new_without_params("first"),
        SqlQuery::new_without_params("second"),
        SqlQuery::new_without_params("third"),
    ];
    let err = client
        .execute_transacted_batched_non_query(&queries, None, ())
        .unwrap_err();
    assert!(matches!(err, DbHelperError::ExecutionError(_)));
    assert_eq!(provider.log.executed(), ["first", "second"]);
    assert_eq!(provider.log.rollbacks(), 1);
    assert_eq!(provider.log.closes(), 1);
}

#[test]
fn batch_parameters_are_checked_before_io() {
    let provider = MockProvider::default();
    let mut client = provider.client();
    let queries = [
        SqlQuery::new_without_params("first"),
        SqlQuery::new(
            "second",
            vec![Parameter::new("out", RowValues::Null)
                .with_db_type(DbType::Text)
                .with_direction(ParameterDirection::Output)],
        ),
    ];
    let err = client
        .execute_transacted_batched_non_query(&queries, None, ())
        .unwrap_err();
    assert!(err.is_config());
    assert_eq!(provider.log.opens(), 0);
}
