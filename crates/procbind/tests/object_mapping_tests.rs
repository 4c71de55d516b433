//! Row-to-struct mapping through the public API.

use chrono::{NaiveDate, NaiveDateTime};
use procbind::core::{DataTable, SqlType, SqlValue};
use procbind::mapping::{MappingService, PropertyMap};
use procbind::{data_bindings, db_enum, DataAccessError, DataSetResult, Json};
use serde::Deserialize;

#[derive(Debug, Default, PartialEq)]
struct Pair {
    first: String,
    second: i32,
}

data_bindings!(Pair {
    first => "Column1",
    second => "Column2",
});

db_enum! {
    enum Tier {
        Basic = 0,
        Gold = 2,
    }
}

#[derive(Debug, Default, PartialEq, Deserialize)]
struct Prefs {
    theme: String,
}

#[derive(Debug, Default)]
struct Customer {
    id: i64,
    name: String,
    token: String,
    raw: Vec<u8>,
    prefs: Json<Prefs>,
    note: String,
    tier: Tier,
    joined: NaiveDateTime,
    birthday: Option<NaiveDate>,
    credit: Option<i32>,
}

data_bindings!(Customer {
    id => "CustomerId",
    name => "Name",
    token => "Token",
    raw => "Token",
    prefs => "Prefs",
    note => "Note",
    tier => "Tier",
    joined => "Joined",
    birthday => "Birthday",
    credit => "Credit",
});

#[derive(Debug, Default)]
struct TextPair {
    column1: String,
    column2: String,
}

data_bindings!(TextPair {
    column1 => "Column1",
    column2 => "Column2",
});

#[derive(Debug, Default)]
struct Unbound {
    id: i32,
}

data_bindings!(Unbound {});

fn pairs() -> DataTable {
    DataTable::new("Table")
        .with_column("Column1", SqlType::String)
        .with_column("Column2", SqlType::I32)
        .with_row(vec![SqlValue::from("a"), SqlValue::I32(1)])
        .with_row(vec![SqlValue::from("b"), SqlValue::I32(2)])
}

fn text_pairs() -> DataTable {
    DataTable::new("Table")
        .with_column("Column1", SqlType::String)
        .with_column("Column2", SqlType::String)
        .with_row(vec![SqlValue::from("Value1"), SqlValue::from("Value2")])
        .with_row(vec![SqlValue::from("Value21"), SqlValue::from("Value22")])
}

fn joined() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2021, 3, 4)
        .unwrap()
        .and_hms_opt(9, 30, 0)
        .unwrap()
}

#[test]
fn test_map_first_row_of_text_table() {
    let row: TextPair = MappingService::map_first_row(Some(&text_pairs())).unwrap();
    assert_eq!(row.column1, "Value1");
    assert_eq!(row.column2, "Value2");
}

#[test]
fn test_map_text_table() {
    let rows: Vec<TextPair> = MappingService::map_table(Some(&text_pairs())).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].column1, "Value1");
    assert_eq!(rows[0].column2, "Value2");
    assert_eq!(rows[1].column1, "Value21");
    assert_eq!(rows[1].column2, "Value22");
}

#[test]
fn test_two_rows_map_in_order() {
    let rows: Vec<Pair> = MappingService::map_table(Some(&pairs())).unwrap();
    assert_eq!(
        rows,
        vec![
            Pair {
                first: "a".into(),
                second: 1
            },
            Pair {
                first: "b".into(),
                second: 2
            },
        ]
    );
}

#[test]
fn test_column_names_match_case_insensitively() {
    let table = DataTable::new("Table")
        .with_column("COLUMN1", SqlType::String)
        .with_column("column2", SqlType::I32)
        .with_column("Extra", SqlType::String)
        .with_row(vec![SqlValue::from("x"), SqlValue::I32(9), SqlValue::from("ignored")]);
    let row: Pair = MappingService::map_first_row(Some(&table)).unwrap();
    assert_eq!(row.first, "x");
    assert_eq!(row.second, 9);
}

#[test]
fn test_full_row_conversions() {
    let table = DataTable::new("Table")
        .with_column("CustomerId", SqlType::I64)
        .with_column("Name", SqlType::String)
        .with_column("Token", SqlType::Bytes)
        .with_column("Prefs", SqlType::String)
        .with_column("Note", SqlType::String)
        .with_column("Tier", SqlType::String)
        .with_column("Joined", SqlType::DateTime)
        .with_column("Birthday", SqlType::Date)
        .with_column("Credit", SqlType::I32)
        .with_row(vec![
            SqlValue::I64(10),
            SqlValue::from("Ada"),
            SqlValue::Bytes(vec![0x0a, 0xff]),
            SqlValue::from(r#"{"theme":"dark"}"#),
            SqlValue::from(r#"{"unrelated": true}"#),
            SqlValue::from("Gold"),
            SqlValue::DateTime(joined()),
            SqlValue::Null(SqlType::Date),
            SqlValue::Null(SqlType::I32),
        ]);

    let customer: Customer = MappingService::map_first_row(Some(&table)).unwrap();
    assert_eq!(customer.id, 10);
    assert_eq!(customer.name, "Ada");
    assert_eq!(customer.prefs.theme, "dark");
    assert_eq!(customer.note, r#"{"unrelated": true}"#);
    assert_eq!(customer.tier, Tier::Gold);
    assert_eq!(customer.joined, joined());
    assert_eq!(customer.birthday, None);
    assert_eq!(customer.credit, None);
}

#[test]
fn test_duplicate_binding_last_declaration_wins() {
    let map = PropertyMap::<Customer>::build();
    assert_eq!(map.get("TOKEN").map(|b| b.property()), Some("raw"));

    let table = DataTable::new("Table")
        .with_column("Token", SqlType::Bytes)
        .with_row(vec![SqlValue::Bytes(vec![1, 2])]);
    let customer: Customer = MappingService::map_first_row(Some(&table)).unwrap();
    assert_eq!(customer.raw, vec![1, 2]);
    assert_eq!(customer.token, "");
}

#[test]
fn test_empty_or_missing_table_yields_defaults() {
    let empty = DataTable::new("Table").with_column("Column1", SqlType::String);
    let rows: Vec<Pair> = MappingService::map_table(Some(&empty)).unwrap();
    assert!(rows.is_empty());
    let rows: Vec<Pair> = MappingService::map_table(None).unwrap();
    assert!(rows.is_empty());

    let first: Pair = MappingService::map_first_row(Some(&empty)).unwrap();
    assert_eq!(first, Pair::default());
}

#[test]
fn test_type_without_bindings_stays_default() {
    let rows: Vec<Unbound> = MappingService::map_table(Some(&pairs())).unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.id == 0));
}

#[test]
fn test_conversion_failure_names_column_and_property() {
    let table = DataTable::new("Table")
        .with_column("Column2", SqlType::String)
        .with_row(vec![SqlValue::from("not a number")]);
    let err = MappingService::map_table::<Pair>(Some(&table)).unwrap_err();
    match err {
        DataAccessError::Mapping {
            column, property, ..
        } => {
            assert_eq!(column, "COLUMN2");
            assert_eq!(property, "second");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_result_envelope_maps_first_table() {
    let result = DataSetResult::success(procbind::DataSet::single(pairs()));
    let rows: Vec<Pair> = result.map_first_table().unwrap();
    assert_eq!(rows.len(), 2);

    let failed = DataSetResult::failure("boom");
    let rows: Vec<Pair> = failed.map_first_table().unwrap();
    assert!(rows.is_empty());
}
