//! Embedded scripting sandbox.
//!
//! Transactions carry two Lua hooks: `pre` runs read-only before changes are
//! applied and approves (0) or rejects (non-zero) the header; `post` runs
//! after and may write rows, which become additional changes inside the same
//! header. Attribute check expressions are evaluated by the same engine over
//! the single variable `value`.
//!
//! The sandbox exposes `log`, `read`, `save`, `update` and `remove`. Row and
//! key tables are string-keyed by attribute name. Only the table, string and
//! math libraries are loaded, so scripts have no filesystem or network
//! reach. A script failure aborts the enclosing header, never the process.

use mlua::{Lua, LuaOptions, MultiValue, StdLib, Table, Value as LuaValue};

use crate::codec::Value;

use super::ServiceError;

/// Row and key tables at the script boundary, in attribute-name form.
pub type ScriptRow = Vec<(String, Value)>;

/// Entity API exposed to a running hook. The sync engine implements this
/// against its open transaction; the `pre` phase hands out a read-only
/// implementation that logs and ignores writes.
pub trait ScriptEnv {
    fn read(&self, entity: &str, key: ScriptRow) -> Result<Option<ScriptRow>, ServiceError>;
    fn save(&self, entity: &str, row: ScriptRow) -> Result<i64, ServiceError>;
    fn update(&self, entity: &str, row: ScriptRow) -> Result<i64, ServiceError>;
    fn remove(&self, entity: &str, key: ScriptRow) -> Result<i64, ServiceError>;
}

fn sandbox() -> Result<Lua, ServiceError> {
    Lua::new_with(
        StdLib::TABLE | StdLib::STRING | StdLib::MATH,
        LuaOptions::default(),
    )
    .map_err(|e| ServiceError::internal(format!("scripting engine: {}", e)))
}

/// One interpreter, bound to a single header execution.
pub struct ScriptHost {
    lua: Lua,
}

impl ScriptHost {
    pub fn new() -> Result<Self, ServiceError> {
        Ok(Self { lua: sandbox()? })
    }

    /// Run one hook script against `env`. Returns the script's integer
    /// result; an empty script approves with 0.
    pub fn run(
        &self,
        name: &str,
        script: &str,
        env: &dyn ScriptEnv,
    ) -> Result<i64, ServiceError> {
        if script.trim().is_empty() {
            return Ok(0);
        }
        let chunk_name = name.to_string();
        self.lua
            .scope(|scope| {
                let globals = self.lua.globals();
                globals.set(
                    "log",
                    scope.create_function(|_, message: String| {
                        tracing::info!("{}", message);
                        Ok(())
                    })?,
                )?;
                globals.set(
                    "read",
                    scope.create_function(|lua, (entity, key): (String, Table)| {
                        let key = table_to_row(&key)?;
                        match env.read(&entity, key) {
                            Ok(Some(row)) => Ok(LuaValue::Table(row_to_table(lua, row)?)),
                            Ok(None) => Ok(LuaValue::Nil),
                            Err(e) => Err(mlua::Error::external(e)),
                        }
                    })?,
                )?;
                globals.set(
                    "save",
                    scope.create_function(|_, (entity, row): (String, Table)| {
                        env.save(&entity, table_to_row(&row)?)
                            .map_err(mlua::Error::external)
                    })?,
                )?;
                globals.set(
                    "update",
                    scope.create_function(|_, (entity, row): (String, Table)| {
                        env.update(&entity, table_to_row(&row)?)
                            .map_err(mlua::Error::external)
                    })?,
                )?;
                globals.set(
                    "remove",
                    scope.create_function(|_, (entity, key): (String, Table)| {
                        env.remove(&entity, table_to_row(&key)?)
                            .map_err(mlua::Error::external)
                    })?,
                )?;

                let results: MultiValue = self.lua.load(script).set_name(chunk_name).eval()?;
                match results.into_iter().next() {
                    None | Some(LuaValue::Nil) => Ok(0),
                    Some(LuaValue::Integer(code)) => Ok(code),
                    Some(LuaValue::Number(code)) => Ok(code as i64),
                    Some(other) => Err(mlua::Error::external(ServiceError::user_validation(
                        format!("script returned {} instead of an integer", other.type_name()),
                    ))),
                }
            })
            .map_err(|e| ServiceError::user_validation(e.to_string()))
    }
}

/// Compile-check an attribute check expression without running it.
pub fn validate_check_expression(expression: &str) -> Result<(), ServiceError> {
    let lua = sandbox()?;
    lua.load(format!("return ({})", expression))
        .into_function()
        .map_err(|e| ServiceError::InvalidSchema(e.to_string()))?;
    Ok(())
}

/// Evaluate a check expression with `value` bound to the candidate field.
/// Truthy results (boolean true or any non-zero number) accept the value.
pub fn check_value(expression: &str, value: &Value) -> Result<bool, ServiceError> {
    let lua = sandbox()?;
    lua.globals()
        .set("value", value_to_lua(&lua, value.clone()).map_err(external)?)
        .map_err(external)?;
    let result: LuaValue = lua
        .load(format!("return ({})", expression))
        .eval()
        .map_err(|e| ServiceError::not_valid_income_data(e.to_string()))?;
    Ok(match result {
        LuaValue::Boolean(b) => b,
        LuaValue::Integer(n) => n != 0,
        LuaValue::Number(n) => n != 0.0,
        _ => false,
    })
}

fn external(e: mlua::Error) -> ServiceError {
    ServiceError::internal(e.to_string())
}

fn value_to_lua(lua: &Lua, value: Value) -> mlua::Result<LuaValue> {
    Ok(match value {
        Value::Integer(v) => LuaValue::Integer(v),
        Value::Real(v) => LuaValue::Number(v),
        Value::Text(v) => LuaValue::String(lua.create_string(&v)?),
        Value::Blob(v) => LuaValue::String(lua.create_string(&v)?),
        Value::Null => LuaValue::Nil,
        Value::Uuid(v) => LuaValue::String(lua.create_string(v.hyphenated().to_string().as_bytes())?),
    })
}

fn lua_to_value(value: &LuaValue) -> mlua::Result<Value> {
    Ok(match value {
        LuaValue::Integer(v) => Value::Integer(*v),
        LuaValue::Number(v) => Value::Real(*v),
        LuaValue::String(s) => match s.to_str() {
            Ok(text) => Value::Text(text.to_string()),
            Err(_) => Value::Blob(s.as_bytes().to_vec()),
        },
        LuaValue::Boolean(v) => Value::Integer(i64::from(*v)),
        LuaValue::Nil => Value::Null,
        other => {
            return Err(mlua::Error::external(format!(
                "unsupported field type {}",
                other.type_name()
            )))
        }
    })
}

fn table_to_row(table: &Table) -> mlua::Result<ScriptRow> {
    let mut row = Vec::new();
    for pair in table.clone().pairs::<String, LuaValue>() {
        let (name, value) = pair?;
        row.push((name, lua_to_value(&value)?));
    }
    Ok(row)
}

fn row_to_table(lua: &Lua, row: ScriptRow) -> mlua::Result<Table> {
    let table = lua.create_table()?;
    for (name, value) in row {
        table.set(name, value_to_lua(lua, value)?)?;
    }
    Ok(table)
}
