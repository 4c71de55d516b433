//! Dispatcher behavior end to end over the in-memory driver.

use procbind::core::{DataSet, DataTable, SqlType, SqlValue};
use procbind::drivers::memory::{Event, MemoryConnection, MemoryHandle, Response};
use procbind::{
    data_bindings, Config, DailyTokenValidator, DataAccess, DbType, Logger, ModifyResult,
    Parameter,
};

const CONFIG: &str = r#"
connection:
  type: memory
access:
  command_timeout_secs: 12
  log_parameter_values: false
security:
  token_secret: "integration-secret"
"#;

#[derive(Debug, Default)]
struct User {
    id: i32,
    name: String,
}

data_bindings!(User { id => "Id", name => "Name" });

fn configured() -> (DataAccess, MemoryHandle) {
    let config = Config::from_yaml(CONFIG).unwrap();
    let access = DataAccess::from_config(&config).unwrap();
    let handle = access.session().connection().memory_handle().unwrap();
    (access, handle)
}

fn token(unencrypted: &str) -> String {
    DailyTokenValidator::new("integration-secret", true)
        .generate(unencrypted)
        .unwrap()
}

fn users() -> DataSet {
    DataSet::single(
        DataTable::new("Table")
            .with_column("Id", SqlType::I32)
            .with_column("Name", SqlType::String)
            .with_row(vec![SqlValue::I32(1), SqlValue::from("ada")])
            .with_row(vec![SqlValue::I32(2), SqlValue::from("grace")]),
    )
}

#[test]
fn test_read_and_map_users() {
    let (mut access, handle) = configured();
    handle.push(Response::Data(users()));

    let result = access.get_data(
        "dbo.GetUsers",
        &[
            Parameter::value("@Active", DbType::Bit, "1"),
            Parameter::value("@Region", DbType::VarChar, ""),
        ],
    );
    let users: Vec<User> = result.map_first_table().unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(users[1].name, "grace");

    let command = &handle.commands()[0];
    assert_eq!(command.text, "dbo.GetUsers");
    assert_eq!(command.params.len(), 1);
    assert_eq!(command.params[0].value, SqlValue::Bool(true));
    assert_eq!(command.timeout.as_secs(), 12);
    assert!(!handle.is_open());
}

#[test]
fn test_secured_modify_with_daily_token() {
    let (mut access, handle) = configured();
    handle.push(Response::ReturnValue(3));

    let params = [Parameter::value("@Id", DbType::Int, "3")];
    let result = access.delete_data_secured("dbo.DeleteUser", &params, &token("client"), "client");
    assert_eq!(result, ModifyResult::success(3));

    let rejected = access.delete_data_secured("dbo.DeleteUser", &params, &token("client"), "other");
    assert_eq!(rejected.result, 0);
    assert_eq!(
        rejected.error,
        "Security token validation failed.  Access to service is denied."
    );
    assert_eq!(handle.commands().len(), 1);
}

#[test]
fn test_return_table_keep_nulls_sends_every_parameter() {
    let (mut access, handle) = configured();
    handle.push(Response::Data(users()));

    let params = [
        Parameter::value("@Id", DbType::Int, "1"),
        Parameter::value("@Name", DbType::NVarChar, ""),
    ];
    let result =
        access.modify_data_return_table_keep_nulls("dbo.RenameUser", &params, &token("c"), "c");
    assert!(result.is_ok());
    let command = &handle.commands()[0];
    assert_eq!(command.params.len(), 2);
    assert!(command.params[1].value.is_null());
}

#[test]
fn test_transaction_spans_calls_and_rolls_back_on_failure() {
    let (mut access, handle) = configured();
    access.start_transaction().unwrap();

    handle
        .push(Response::ReturnValue(1))
        .push(Response::Fail("constraint violation".into()));
    assert!(access.modify_data("dbo.Step1", &[]).is_ok());
    assert!(handle.is_open());
    assert!(access.in_transaction());

    let failed = access.modify_data("dbo.Step2", &[]);
    assert_eq!(failed, ModifyResult::failure(0, "constraint violation"));
    assert!(!access.in_transaction());
    assert!(!handle.is_open());
    assert_eq!(handle.count(&Event::Rollback), 1);
    assert_eq!(handle.count(&Event::Commit), 0);
}

#[test]
fn test_checked_raw_sql_inside_transaction_joins_it() {
    let (mut access, handle) = configured();
    access.start_transaction().unwrap();
    handle.push(Response::Affected(2));

    let result = access.modify_raw_sql_checked("update t set a = 1", 2);
    assert_eq!(result, ModifyResult::success(2));
    assert_eq!(handle.count(&Event::Begin), 1);
    assert!(access.in_transaction());

    access.end_transaction().unwrap();
    assert_eq!(handle.count(&Event::Commit), 1);
    assert!(!handle.is_open());
}

#[test]
fn test_insert_raw_sql_returns_identity() {
    let (mut access, handle) = configured();
    handle
        .push(Response::Affected(1))
        .push(Response::Scalar(Some(SqlValue::I64(501))));
    let result = access.insert_raw_sql("insert into users (name) values ('ada')");
    assert_eq!(result, ModifyResult::success(501));
    assert_eq!(handle.commands()[1].text, "SELECT SCOPE_IDENTITY()");
}

#[test]
fn test_timeout_reset_and_override() {
    let (mut access, _) = configured();
    assert_eq!(access.command_timeout_secs(), 12);
    access.set_command_timeout(0);
    assert_eq!(access.command_timeout_secs(), 30);
    access.set_command_timeout(90);
    assert_eq!(access.command_timeout_secs(), 90);
}

#[test]
fn test_failure_log_redacts_values_when_configured() {
    let (logger, buffer) = Logger::capture();
    let conn = MemoryConnection::new();
    conn.handle().push(Response::Fail("arithmetic overflow".into()));
    let mut access = DataAccess::with_logger(conn, logger.with_parameter_values(false));

    access.modify_data("dbo.Save", &[Parameter::value("@Pin", DbType::VarChar, "1234")]);
    assert!(buffer.contains("arithmetic overflow"));
    assert!(buffer.contains("@Pin = ***"));
    assert!(!buffer.contains("1234"));
}

#[test]
fn test_missing_security_section_denies_secured_calls() {
    let config = Config::from_yaml("connection:\n  type: memory\n").unwrap();
    let mut access = DataAccess::from_config(&config).unwrap();
    let result = access.insert_data_secured("dbo.Add", &[], "anything", "anything");
    assert_eq!(result.result, 0);
    assert!(!result.is_ok());
}
