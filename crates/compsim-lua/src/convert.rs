//! Conversion between [`BindingValue`] and Lua values.
//!
//! | Binding | Lua |
//! |---------|-----|
//! | `Nil` | `nil` |
//! | `Bool` | boolean |
//! | `Int` | integer |
//! | `Number` | float |
//! | `Str` | string |
//! | `List` | sequence table `{a, b, c}` |
//! | `Table` | table with string keys |
//!
//! Going back, a table whose keys are exactly `1..=n` becomes a `List`;
//! any other table becomes a `Table` with integer keys written as strings.
//! Functions, threads and userdata do not cross the boundary.

use crate::LuaError;
use compsim_runtime::script::{BindingValue, Table as BindingMap};
use mlua::{Lua, Table, Value};

/// Deepest table nesting accepted from a script. Also stops cycles.
pub const MAX_DEPTH: usize = 32;

/// Converts a binding value into a Lua value.
///
/// # Errors
///
/// Returns [`LuaError::Runtime`] if the VM cannot allocate.
pub fn to_lua(lua: &Lua, value: &BindingValue) -> Result<Value, LuaError> {
    Ok(match value {
        BindingValue::Nil => Value::Nil,
        BindingValue::Bool(b) => Value::Boolean(*b),
        BindingValue::Int(i) => Value::Integer(*i),
        BindingValue::Number(n) => Value::Number(*n),
        BindingValue::Str(s) => Value::String(lua.create_string(s)?),
        BindingValue::List(items) => {
            let table = lua.create_table_with_capacity(items.len(), 0)?;
            for (idx, item) in items.iter().enumerate() {
                table.raw_set(idx + 1, to_lua(lua, item)?)?;
            }
            Value::Table(table)
        }
        BindingValue::Table(map) => Value::Table(map_to_lua(lua, map)?),
    })
}

/// Converts a binding map into a Lua table.
///
/// # Errors
///
/// Returns [`LuaError::Runtime`] if the VM cannot allocate.
pub fn map_to_lua(lua: &Lua, map: &BindingMap) -> Result<Table, LuaError> {
    let table = lua.create_table_with_capacity(0, map.len())?;
    for (key, value) in map {
        table.raw_set(key.as_str(), to_lua(lua, value)?)?;
    }
    Ok(table)
}

/// Converts a Lua value into a binding value.
///
/// Functions, threads and userdata become `Nil`; inside tables their
/// entries are dropped.
///
/// # Errors
///
/// Returns [`LuaError::Conversion`] if tables nest deeper than
/// [`MAX_DEPTH`] (which includes self-referencing tables).
pub fn from_lua(value: &Value) -> Result<BindingValue, LuaError> {
    from_lua_at(value, 0)
}

fn from_lua_at(value: &Value, depth: usize) -> Result<BindingValue, LuaError> {
    Ok(match value {
        Value::Boolean(b) => BindingValue::Bool(*b),
        Value::Integer(i) => BindingValue::Int(*i),
        Value::Number(n) => BindingValue::Number(*n),
        Value::String(s) => BindingValue::Str(s.to_string_lossy()),
        Value::Table(table) => table_from_lua(table, depth + 1)?,
        _ => BindingValue::Nil,
    })
}

fn table_from_lua(table: &Table, depth: usize) -> Result<BindingValue, LuaError> {
    if depth > MAX_DEPTH {
        return Err(LuaError::Conversion(format!(
            "tables nested deeper than {MAX_DEPTH} levels"
        )));
    }

    let mut entries: Vec<(Value, BindingValue)> = Vec::new();
    for pair in table.clone().pairs::<Value, Value>() {
        let (key, value) = pair?;
        if matches!(
            value,
            Value::Function(_) | Value::Thread(_) | Value::UserData(_) | Value::LightUserData(_)
        ) {
            continue;
        }
        entries.push((key, from_lua_at(&value, depth)?));
    }

    let len = table.raw_len();
    let is_sequence = len > 0
        && entries.len() == len
        && entries
            .iter()
            .all(|(k, _)| matches!(k, Value::Integer(i) if *i >= 1 && usize::try_from(*i).is_ok_and(|i| i <= len)));
    if is_sequence {
        entries.sort_by_key(|(k, _)| match k {
            Value::Integer(i) => *i,
            _ => 0,
        });
        return Ok(BindingValue::List(entries.into_iter().map(|(_, v)| v).collect()));
    }

    let mut map = BindingMap::new();
    for (key, value) in entries {
        let key = match key {
            Value::String(s) => s.to_string_lossy(),
            Value::Integer(i) => i.to_string(),
            Value::Number(n) => n.to_string(),
            Value::Boolean(b) => b.to_string(),
            _ => continue,
        };
        map.insert(key, value);
    }
    Ok(BindingValue::Table(map))
}
