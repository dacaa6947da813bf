#![cfg(feature = "sqlite")]

mod common;

use common::{Person, unique_db_path};
use sql_dbhelper::prelude::*;
use tempfile::TempDir;

fn seeded_client(prefix: &str) -> Result<(TempDir, DbClient), Box<dyn std::error::Error>> {
    let (dir, path) = unique_db_path(prefix);
    let mut client = DbClient::sqlite(format!("Data Source={path}"));
    client.execute_non_query(
        CommandKind::Text,
        "CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT NOT NULL, score INTEGER, nickname TEXT);
         INSERT INTO people (id, name, score, nickname) VALUES (1, 'Ada', 90, NULL);
         INSERT INTO people (id, name, score, nickname) VALUES (2, 'Bob', NULL, 'bobby');
         INSERT INTO people (id, name, score, nickname) VALUES (3, 'Cy', 75, NULL);",
        (),
    )?;
    Ok((dir, client))
}

#[test]
fn non_query_and_scalar() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, mut client) = seeded_client("nonquery")?;

    client.add_parameter("score", 100)?;
    client.add_parameter("id", 3)?;
    let affected = client.execute_non_query(
        CommandKind::Text,
        "UPDATE people SET score = @score WHERE id = @id",
        (),
    )?;
    assert_eq!(affected, 1);

    client.clear_parameters();
    client.add_parameter("min", 80)?;
    let count = client.execute_scalar(
        CommandKind::Text,
        "SELECT COUNT(*) FROM people WHERE score >= @min",
        (),
    )?;
    assert_eq!(count, RowValues::Int(2));

    client.clear_parameters();
    let none = client.execute_scalar(
        CommandKind::Text,
        "SELECT name FROM people WHERE id = 99",
        (),
    )?;
    assert_eq!(none, RowValues::Null);
    Ok(())
}

#[test]
fn positional_and_prefixed_parameters() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, mut client) = seeded_client("positional")?;
    client.add_parameters([Parameter::positional(4), Parameter::positional("Dee")])?;
    let affected = client.execute_non_query(
        CommandKind::Text,
        "INSERT INTO people (id, name) VALUES (?, ?)",
        (),
    )?;
    assert_eq!(affected, 1);

    client.clear_parameters();
    client.add_parameter("name", "Dee")?;
    let id = client.execute_scalar(
        CommandKind::Text,
        "SELECT id FROM people WHERE name = :name",
        (),
    )?;
    assert_eq!(id, RowValues::Int(4));

    client.clear_parameters();
    let err = client
        .execute_scalar(CommandKind::Text, "SELECT id FROM people WHERE name = @missing", ())
        .unwrap_err();
    assert!(err.is_config(), "unexpected error: {err}");
    Ok(())
}

#[test]
fn reader_walks_rows() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, mut client) = seeded_client("reader")?;
    let mut reader = client.get_reader(
        CommandKind::Text,
        "SELECT id, name, score FROM people ORDER BY id",
        CommandBehavior::DEFAULT,
        (),
    )?;
    assert_eq!(reader.field_count(), 3);
    assert_eq!(reader.get_ordinal("NAME"), Some(1));

    let mut names = Vec::new();
    while reader.read()? {
        names.push(reader.get_value_by_name("name")?.to_string());
        if reader.get_value(0)? == RowValues::Int(2) {
            assert!(reader.is_null(2)?);
        }
    }
    assert_eq!(names, ["Ada", "Bob", "Cy"]);
    assert!(!reader.next_result()?);

    reader.close()?;
    reader.close()?;
    assert!(reader.is_closed());
    assert!(reader.read().is_err());
    Ok(())
}

#[test]
fn data_objects() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, mut client) = seeded_client("objects")?;

    client.add_parameter("id", 2)?;
    let bob: Person = client.get_data_object(
        CommandKind::Text,
        "SELECT * FROM people WHERE id = @id",
        (),
    )?;
    assert_eq!(bob.name, "Bob");
    assert_eq!(bob.score, 0);
    assert_eq!(bob.nickname.as_deref(), Some("bobby"));

    client.replace_parameter_value("id", 42)?;
    let nobody: Person = client.get_data_object(
        CommandKind::Text,
        "SELECT * FROM people WHERE id = @id",
        (),
    )?;
    assert_eq!(nobody, Person::default());

    client.clear_parameters();
    let everyone: Vec<Person> =
        client.get_data_object_list(CommandKind::Text, "SELECT * FROM people ORDER BY id", ())?;
    assert_eq!(everyone.len(), 3);
    assert_eq!(everyone[2].score, 75);
    Ok(())
}

#[test]
fn object_iterators_are_independent() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, mut client) = seeded_client("iter")?;
    let sql = "SELECT * FROM people ORDER BY id";

    let mut first = client.get_data_object_iter::<Person>(CommandKind::Text, sql, ())?;
    let mut second = client.get_data_object_iter::<Person>(CommandKind::Text, sql, ())?;

    assert_eq!(first.next().transpose()?.map(|p| p.id), Some(1));
    assert_eq!(first.next().transpose()?.map(|p| p.id), Some(2));
    assert_eq!(second.next().transpose()?.map(|p| p.id), Some(1));

    let rest: Vec<i64> = first.map(|p| p.map(|p| p.id)).collect::<Result<_, _>>()?;
    assert_eq!(rest, [3]);
    let rest: Vec<i64> = second.map(|p| p.map(|p| p.id)).collect::<Result<_, _>>()?;
    assert_eq!(rest, [2, 3]);
    Ok(())
}

#[test]
fn caller_connection_stays_open() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, mut client) = seeded_client("caller")?;
    let conn = client.get_connection(None)?;
    assert_eq!(conn.state(), ConnectionState::Closed);

    let count = client.execute_scalar(CommandKind::Text, "SELECT COUNT(*) FROM people", &conn)?;
    assert_eq!(count, RowValues::Int(3));
    assert_eq!(conn.state(), ConnectionState::Open);

    let reader = client.get_reader(
        CommandKind::Text,
        "SELECT id FROM people",
        CommandBehavior::CLOSE_CONNECTION,
        &conn,
    )?;
    drop(reader);
    assert_eq!(conn.state(), ConnectionState::Closed);
    Ok(())
}

#[test]
fn command_kinds_and_schema() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, mut client) = seeded_client("kinds")?;

    let rows: Vec<Person> = client.get_data_object_list(CommandKind::TableDirect, "people", ())?;
    assert_eq!(rows.len(), 3);

    let err = client
        .execute_non_query(CommandKind::StoredProcedure, "do_things", ())
        .unwrap_err();
    assert!(matches!(err, DbHelperError::Unimplemented(_)));

    let tables = client.get_schema(Some("Tables"), &[], ())?;
    let names: Vec<String> = tables
        .results
        .iter()
        .filter_map(|row| row.get("TABLE_NAME").map(ToString::to_string))
        .collect();
    assert_eq!(names, ["people"]);

    let columns = client.get_schema(
        Some("Columns"),
        &[Some("people".into()), Some("score".into())],
        (),
    )?;
    assert_eq!(columns.len(), 1);
    assert_eq!(
        columns.results[0].get("ORDINAL_POSITION"),
        Some(&RowValues::Int(3))
    );

    let err = client.get_schema(Some("Procedures"), &[], ()).unwrap_err();
    assert!(matches!(err, DbHelperError::Unimplemented(_)));
    Ok(())
}

#[test]
fn driver_errors_pass_through() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, mut client) = seeded_client("errors")?;
    let err = client
        .execute_non_query(CommandKind::Text, "INSERT INTO people (id) VALUES (1)", ())
        .unwrap_err();
    assert!(matches!(err, DbHelperError::SqliteError(_)), "{err:?}");
    Ok(())
}
