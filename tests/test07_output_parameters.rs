mod common;

use common::{MockProvider, MockScript};
use sql_dbhelper::prelude::*;

fn client_with_outputs(provider: &MockProvider) -> Result<DbClient, DbHelperError> {
    let mut client = provider.client();
    client.add_parameter("id", 7)?;
    client.add_typed_parameter(
        "new_id",
        RowValues::Null,
        DbType::Integer,
        None,
        ParameterDirection::Output,
    )?;
    client.add_typed_parameter(
        "message",
        RowValues::Null,
        DbType::Text,
        Some(100),
        ParameterDirection::InputOutput,
    )?;
    Ok(client)
}

#[test]
fn outputs_are_copied_back_into_the_store() -> Result<(), Box<dyn std::error::Error>> {
    let provider = MockProvider::default();
    let mut client = client_with_outputs(&provider)?;

    client.execute_non_query(CommandKind::StoredProcedure, "create_thing", ())?;

    assert_eq!(client.get_parameter_value("new_id"), Some(&RowValues::Int(42)));
    assert_eq!(
        client.get_parameter_value("@message"),
        Some(&RowValues::Text("out".into()))
    );
    assert_eq!(client.get_parameter_value("id"), Some(&RowValues::Int(7)));
    assert_eq!(client.parameters().len(), 3);

    let sent = provider.log.last_parameters.lock().unwrap().clone();
    assert_eq!(
        sent.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
        ["@id", "@new_id", "@message"]
    );
    Ok(())
}

#[test]
fn outputs_are_captured_when_the_statement_fails() -> Result<(), Box<dyn std::error::Error>> {
    let provider = MockProvider::new(MockScript {
        fail_on: Some("broken".into()),
        ..MockScript::default()
    });
    let mut client = client_with_outputs(&provider)?;
    client.set_variable_binder(":");
    client.add_parameter("extra", true)?;

    assert!(client
        .execute_non_query(CommandKind::Text, "broken", ())
        .is_err());

    // the executed list replaces the store, so every name now carries the new binder
    let names: Vec<&str> = client.parameters().iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, [":id", ":new_id", ":message", ":extra"]);
    assert_eq!(client.get_parameter_value("new_id"), Some(&RowValues::Null));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn async_outputs_and_transacted_capture() -> Result<(), Box<dyn std::error::Error>> {
    let provider = MockProvider::default();
    let mut client = client_with_outputs(&provider)?;
    let token = CancellationToken::new();

    client
        .execute_transacted_non_query_async(CommandKind::Text, "UPDATE t", None, (), &token)
        .await?;
    assert_eq!(client.get_parameter_value("new_id"), Some(&RowValues::Int(42)));
    assert_eq!(provider.log.commits(), 1);

    client.replace_parameter_value("new_id", RowValues::Null)?;
    client
        .execute_scalar_async(CommandKind::Text, "SELECT", (), &token)
        .await?;
    assert_eq!(client.get_parameter_value("new_id"), Some(&RowValues::Int(42)));
    Ok(())
}

#[test]
fn batches_leave_the_store_alone() -> Result<(), Box<dyn std::error::Error>> {
    let provider = MockProvider::default();
    let mut client = client_with_outputs(&provider)?;
    let queries = [SqlQuery::new(
        "call",
        vec![Parameter::new("result", RowValues::Null)
            .with_db_type(DbType::Integer)
            .with_direction(ParameterDirection::Output)],
    )];

    let total = client.execute_batched_non_query(&queries, ())?;
    assert_eq!(total, 1);
    assert_eq!(client.get_parameter_value("new_id"), Some(&RowValues::Null));
    assert!(!client.contains_parameter("result"));
    Ok(())
}

#[cfg(feature = "sqlite")]
#[test]
fn sqlite_leaves_output_parameters_unbound() -> Result<(), Box<dyn std::error::Error>> {
    let (_dir, path) = common::unique_db_path("outputs");
    let mut client = DbClient::sqlite(format!("Data Source={path}"));
    client.add_parameter("value", 5)?;
    client.add_typed_parameter(
        "ignored",
        RowValues::Null,
        DbType::Integer,
        None,
        ParameterDirection::Output,
    )?;

    let doubled = client.execute_scalar(CommandKind::Text, "SELECT @value * 2", ())?;
    assert_eq!(doubled, RowValues::Int(10));
    assert_eq!(client.get_parameter_value("ignored"), Some(&RowValues::Null));
    Ok(())
}
