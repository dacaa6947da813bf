mod common;

use common::{MockProvider, MockScript, Person, result_set};
use sql_dbhelper::prelude::*;
#[cfg(feature = "sqlite")]
use tempfile::TempDir;

#[derive(Debug, Default, PartialEq)]
struct Total {
    count: i64,
}

impl DataObject for Total {
    fn describe(map: &mut FieldMap<Self>) {
        map.field("Count", |t: &mut Total, v: i64| t.count = v)
            .column("total");
    }
}

#[cfg(feature = "sqlite")]
fn seeded_client(prefix: &str) -> Result<(TempDir, DbClient), Box<dyn std::error::Error>> {
    let (dir, path) = common::unique_db_path(prefix);
    let mut client = DbClient::sqlite(format!("Data Source={path}"));
    client.execute_non_query(
        CommandKind::Text,
        "CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT NOT NULL, score INTEGER, nickname TEXT);
         INSERT INTO people (id, name, score) VALUES (1, 'Ada', 90), (2, 'Bob', 60), (3, 'Cy', 75);",
        (),
    )?;
    Ok((dir, client))
}

#[cfg(feature = "sqlite")]
#[test]
fn reads_each_result_set_in_turn() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, mut client) = seeded_client("multi")?;
    client.add_parameter("min", 70)?;

    let mut multi = client.get_multi_result_reader(
        CommandKind::Text,
        "SELECT * FROM people WHERE score >= @min ORDER BY id;
         SELECT COUNT(*) AS total FROM people;
         SELECT * FROM people WHERE id = 2;",
        (),
    )?;

    let passing: Vec<Person> = multi.read_object_list()?;
    assert_eq!(passing.iter().map(|p| p.id).collect::<Vec<_>>(), [1, 3]);
    assert!(multi.read_object::<Person>()?.is_none());

    assert!(multi.move_to_next_result()?);
    assert_eq!(multi.column_names().as_slice(), ["total"]);
    assert_eq!(multi.read_object::<Total>()?, Some(Total { count: 3 }));

    assert!(multi.move_to_next_result()?);
    let bob = multi.read_object_iter::<Person>().next().transpose()?;
    assert_eq!(bob.map(|p| p.name).as_deref(), Some("Bob"));

    assert!(!multi.move_to_next_result()?);
    multi.close()?;
    multi.close()?;
    assert!(multi.is_closed());
    Ok(())
}

#[cfg(feature = "sqlite")]
#[test]
fn single_result_behavior_stops_after_first_set() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, mut client) = seeded_client("single")?;
    let mut reader = client.get_reader(
        CommandKind::Text,
        "SELECT id FROM people; SELECT name FROM people;",
        CommandBehavior::SINGLE_RESULT,
        (),
    )?;
    let mut rows = 0;
    while reader.read()? {
        rows += 1;
    }
    assert_eq!(rows, 3);
    assert!(!reader.next_result()?);

    let mut reader = client.get_reader(
        CommandKind::Text,
        "SELECT id, name FROM people",
        CommandBehavior::SCHEMA_ONLY,
        (),
    )?;
    assert_eq!(reader.column_names().as_slice(), ["id", "name"]);
    assert!(!reader.read()?);
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn async_multi_result_over_mock() -> Result<(), Box<dyn std::error::Error>> {
    let provider = MockProvider::new(MockScript {
        result_sets: vec![
            result_set(
                &["Id", "Name"],
                vec![
                    vec![RowValues::Int(1), "Ada".into()],
                    vec![RowValues::Int(2), "Bob".into()],
                ],
            ),
            result_set(&["total"], vec![vec![RowValues::Int(2)]]),
        ],
        ..MockScript::default()
    });
    let mut client = provider.client();
    let token = CancellationToken::new();

    let mut multi = client
        .get_multi_result_reader_async(CommandKind::Text, "SELECT", (), &token)
        .await?;

    let first: Option<Person> = multi.read_object_async(&token).await?;
    assert_eq!(first.map(|p| p.id), Some(1));
    let rest: Vec<Person> = multi.read_object_stream(&token).try_collect().await?;
    assert_eq!(rest.len(), 1);

    assert!(multi.move_to_next_result_async(&token).await?);
    let totals: Vec<Total> = multi.read_object_list_async(&token).await?;
    assert_eq!(totals, [Total { count: 2 }]);
    assert!(!multi.move_to_next_result_async(&token).await?);

    assert_eq!(provider.log.closes(), 0);
    multi.close_async().await?;
    multi.close_async().await?;
    assert_eq!(provider.log.closes(), 1);
    Ok(())
}
