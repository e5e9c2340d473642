//! Script sandbox tests.

use std::cell::RefCell;

use crate::codec::Value;

use super::script::{check_value, validate_check_expression, ScriptEnv, ScriptHost, ScriptRow};
use super::ServiceError;

/// Test double recording what scripts asked for.
#[derive(Default)]
struct FakeEnv {
    row: Option<ScriptRow>,
    saved: RefCell<Vec<(String, ScriptRow)>>,
}

impl ScriptEnv for FakeEnv {
    fn read(&self, _entity: &str, _key: ScriptRow) -> Result<Option<ScriptRow>, ServiceError> {
        Ok(self.row.clone())
    }

    fn save(&self, entity: &str, row: ScriptRow) -> Result<i64, ServiceError> {
        self.saved.borrow_mut().push((entity.to_string(), row));
        Ok(1)
    }

    fn update(&self, _entity: &str, _row: ScriptRow) -> Result<i64, ServiceError> {
        Ok(1)
    }

    fn remove(&self, _entity: &str, _key: ScriptRow) -> Result<i64, ServiceError> {
        Ok(1)
    }
}

#[test]
fn empty_script_approves() {
    let host = ScriptHost::new().unwrap();
    let env = FakeEnv::default();
    assert_eq!(host.run("pre", "", &env).unwrap(), 0);
    assert_eq!(host.run("pre", "   ", &env).unwrap(), 0);
}

#[test]
fn scripts_return_integer_verdicts() {
    let host = ScriptHost::new().unwrap();
    let env = FakeEnv::default();
    assert_eq!(host.run("pre", "return 0", &env).unwrap(), 0);
    assert_eq!(host.run("pre", "return 7", &env).unwrap(), 7);
    assert_eq!(host.run("pre", "log('checking'); return 0", &env).unwrap(), 0);
}

#[test]
fn scripts_can_read_rows() {
    let host = ScriptHost::new().unwrap();
    let env = FakeEnv {
        row: Some(vec![
            ("id".to_string(), Value::Integer(4)),
            ("amount".to_string(), Value::Integer(10)),
        ]),
        ..Default::default()
    };
    let script = r#"
        local row = read("orders", {id = 4})
        if row.amount > 5 then return 0 else return 1 end
    "#;
    assert_eq!(host.run("pre", script, &env).unwrap(), 0);
}

#[test]
fn missing_row_reads_as_nil() {
    let host = ScriptHost::new().unwrap();
    let env = FakeEnv::default();
    let script = r#"
        if read("orders", {id = 4}) == nil then return 3 end
        return 0
    "#;
    assert_eq!(host.run("pre", script, &env).unwrap(), 3);
}

#[test]
fn scripts_can_save_rows() {
    let host = ScriptHost::new().unwrap();
    let env = FakeEnv::default();
    let script = r#"return save("audit", {id = 1, note = "created"})"#;
    assert_eq!(host.run("post", script, &env).unwrap(), 1);
    let saved = env.saved.borrow();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].0, "audit");
    assert!(saved[0]
        .1
        .iter()
        .any(|(name, value)| name == "note" && *value == Value::Text("created".to_string())));
}

#[test]
fn runtime_errors_become_user_validation() {
    let host = ScriptHost::new().unwrap();
    let env = FakeEnv::default();
    let err = host.run("pre", "error('nope')", &env).unwrap_err();
    assert!(matches!(err, ServiceError::UserValidation(_)));
}

#[test]
fn sandbox_has_no_filesystem_reach() {
    let host = ScriptHost::new().unwrap();
    let env = FakeEnv::default();
    assert!(host.run("pre", "return io.open('/etc/passwd')", &env).is_err());
    assert!(host.run("pre", "return os.execute('true')", &env).is_err());
}

#[test]
fn check_expressions_evaluate_over_value() {
    assert!(check_value("value > 0", &Value::Integer(5)).unwrap());
    assert!(!check_value("value > 0", &Value::Integer(-5)).unwrap());
    assert!(check_value("value >= 0.5", &Value::Real(0.75)).unwrap());
    assert!(check_value("#value > 2", &Value::Text("abcd".to_string())).unwrap());
    assert!(!check_value("#value > 2", &Value::Text("a".to_string())).unwrap());
}

#[test]
fn check_expression_validation_rejects_garbage() {
    assert!(validate_check_expression("value > 0").is_ok());
    assert!(validate_check_expression("value >>> 0").is_err());
}
