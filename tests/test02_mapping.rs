mod common;

use std::str::FromStr;

use common::Person;
use sql_dbhelper::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
enum Status {
    #[default]
    Pending,
    Active,
    Closed,
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" | "0" => Ok(Status::Pending),
            "active" | "1" => Ok(Status::Active),
            "closed" | "2" => Ok(Status::Closed),
            other => Err(format!("unknown status {other}")),
        }
    }
}

#[derive(Debug, Default, PartialEq)]
struct Ticket {
    id: u32,
    status: Status,
    previous: Option<Status>,
    price: f64,
    open: bool,
    notes: String,
}

impl DataObject for Ticket {
    fn describe(map: &mut FieldMap<Self>) {
        map.field("Id", |t: &mut Ticket, v: u32| t.id = v)
            .column("ticket_id");
        map.enum_field("Status", |t: &mut Ticket, v: Status| t.status = v);
        map.nullable_enum_field("Previous", |t: &mut Ticket, v: Option<Status>| t.previous = v);
        map.field("Price", |t: &mut Ticket, v: f64| t.price = v);
        map.field("Open", |t: &mut Ticket, v: bool| t.open = v);
        map.field("Notes", |t: &mut Ticket, v: String| t.notes = v)
            .ignore();
    }
}

#[test]
fn maps_columns_case_insensitively() -> Result<(), Box<dyn std::error::Error>> {
    let row = DataRow::from_pairs([
        ("ID", RowValues::Int(7)),
        ("name", RowValues::Text("Ada".into())),
        ("SCORE", RowValues::Int(99)),
        ("nickname", RowValues::Null),
        ("extra", RowValues::Bool(true)),
    ]);
    let person: Person = map_row(&row)?;
    assert_eq!(
        person,
        Person {
            id: 7,
            name: "Ada".into(),
            score: 99,
            nickname: None,
        }
    );
    Ok(())
}

#[test]
fn null_uses_declared_default() -> Result<(), Box<dyn std::error::Error>> {
    let row = DataRow::from_pairs([
        ("Id", RowValues::Int(1)),
        ("Name", RowValues::Text("Bob".into())),
        ("Score", RowValues::Null),
        ("Nickname", RowValues::Text("bobby".into())),
    ]);
    let person: Person = map_row(&row)?;
    assert_eq!(person.score, 0);
    assert_eq!(person.nickname.as_deref(), Some("bobby"));
    Ok(())
}

#[test]
fn missing_columns_keep_defaults() -> Result<(), Box<dyn std::error::Error>> {
    let row = DataRow::from_pairs([("Name", RowValues::Text("Solo".into()))]);
    let person: Person = map_row(&row)?;
    assert_eq!(person.id, 0);
    assert_eq!(person.name, "Solo");
    Ok(())
}

#[test]
fn null_into_plain_field_names_the_property() {
    let row = DataRow::from_pairs([("Id", RowValues::Int(1)), ("Name", RowValues::Null)]);
    let err = map_row::<Person>(&row).unwrap_err();
    match err {
        DbHelperError::MappingError { property, .. } => assert_eq!(property, "Name"),
        other => panic!("expected mapping error, got {other:?}"),
    }
}

#[test]
fn enums_renamed_and_ignored_fields() -> Result<(), Box<dyn std::error::Error>> {
    let row = DataRow::from_pairs([
        ("ticket_id", RowValues::Int(12)),
        ("status", RowValues::Text("Active".into())),
        ("previous", RowValues::Int(0)),
        ("price", RowValues::Int(3)),
        ("open", RowValues::Int(1)),
        ("notes", RowValues::Text("skip me".into())),
    ]);
    let ticket: Ticket = map_row(&row)?;
    assert_eq!(
        ticket,
        Ticket {
            id: 12,
            status: Status::Active,
            previous: Some(Status::Pending),
            price: 3.0,
            open: true,
            notes: String::new(),
        }
    );

    let row = DataRow::from_pairs([
        ("ticket_id", RowValues::Int(13)),
        ("status", RowValues::Text("closed".into())),
        ("previous", RowValues::Null),
    ]);
    let ticket: Ticket = map_row(&row)?;
    assert_eq!(ticket.status, Status::Closed);
    assert_eq!(ticket.previous, None);
    Ok(())
}

#[test]
fn bad_values_fail_with_the_field_name() {
    let row = DataRow::from_pairs([("status", RowValues::Text("archived".into()))]);
    let err = map_row::<Ticket>(&row).unwrap_err();
    assert!(err.is_mapping());
    assert!(err.to_string().contains("Status"), "{err}");

    let row = DataRow::from_pairs([("ticket_id", RowValues::Int(-1))]);
    let err = map_row::<Ticket>(&row).unwrap_err();
    assert!(matches!(err, DbHelperError::MappingError { ref property, .. } if property == "Id"));
}
