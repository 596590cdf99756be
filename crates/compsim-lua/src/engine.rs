//! [`ScriptEngine`] backed by a fresh Lua 5.4 state per execution.

use crate::convert::{from_lua, map_to_lua, to_lua};
use crate::LuaError;
use compsim_runtime::config::ScriptConfig;
use compsim_runtime::script::{
    BindingTable, BindingValue, Script, ScriptEngine, ScriptFailure, ScriptOutcome, Table,
    GLOBALS_KEY, KERNEL_TABLE_KEY, PROCESS_TABLE_KEY,
};
use compsim_types::ErrorCode;
use mlua::{HookTriggers, Lua, LuaOptions, MultiValue, StdLib, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Base-library globals removed before any script runs.
const STRIPPED_GLOBALS: &[&str] = &["load", "loadfile", "dofile", "collectgarbage", "print"];

/// Binding names that are never captured as carried globals.
const RESERVED_GLOBALS: &[&str] = &["params", GLOBALS_KEY, KERNEL_TABLE_KEY, PROCESS_TABLE_KEY];

/// Lua engine.
///
/// Each execution gets its own VM with only the `table`, `string`, `math`,
/// `utf8` and `coroutine` libraries plus the base functions that cannot
/// reach the host. Host operations appear as namespace tables
/// (`fs.read(path)`), and `print` is an alias of `std.print` when the
/// binding table carries it.
///
/// # Carried globals
///
/// Plain data globals a script defines (strings, numbers, booleans,
/// tables without functions) are returned as the outcome environment so
/// the runtime can hand them to the next execution of the same process.
/// A `process_table` global mutated in place is read back as well.
#[derive(Debug, Clone, Default)]
pub struct LuaEngine {
    instruction_limit: u64,
}

impl LuaEngine {
    /// Engine without an instruction limit.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Aborts any execution after `limit` VM instructions; 0 disables it.
    #[must_use]
    pub fn with_instruction_limit(mut self, limit: u64) -> Self {
        self.instruction_limit = limit;
        self
    }

    /// Engine configured from the `[script]` config section.
    #[must_use]
    pub fn from_config(config: &ScriptConfig) -> Self {
        Self::new().with_instruction_limit(config.instruction_limit)
    }

    /// Configured instruction limit, 0 when unlimited.
    #[must_use]
    pub fn instruction_limit(&self) -> u64 {
        self.instruction_limit
    }

    fn run(&self, script: &Script, bindings: &BindingTable) -> Result<ScriptOutcome, LuaError> {
        let lua = sandboxed_vm()?;
        let builtin: HashSet<String> = global_names(&lua)?;
        let mut reserved: HashSet<String> =
            RESERVED_GLOBALS.iter().map(|s| (*s).to_string()).collect();

        install_values(&lua, bindings)?;
        for namespace in install_operations(&lua, bindings)? {
            reserved.insert(namespace);
        }

        let tripped = Arc::new(AtomicBool::new(false));
        if self.instruction_limit > 0 {
            let every = u32::try_from(self.instruction_limit).unwrap_or(u32::MAX);
            let flag = Arc::clone(&tripped);
            lua.set_hook(HookTriggers::new().every_nth_instruction(every), move |_lua, _debug| {
                flag.store(true, Ordering::Release);
                Err(mlua::Error::RuntimeError("instruction limit exceeded".into()))
            });
        }

        let source = strip_shebang(script.source());
        let chunk = lua.load(&*source).set_name(format!("={}", script.path()));
        let result: mlua::Result<Value> = chunk.eval();
        lua.remove_hook();

        let returned = match result {
            Ok(value) => value,
            Err(_) if tripped.load(Ordering::Acquire) => {
                return Err(LuaError::LimitExceeded(self.instruction_limit));
            }
            Err(e) => return Err(e.into()),
        };

        let returned = from_lua(&returned)?;
        let process_table = read_process_table(&lua)?;
        let environment = capture_environment(&lua, &builtin, &reserved)?;
        let outcome = ScriptOutcome::from_return(returned)
            .map_err(|e| match e {
                ScriptFailure::InvalidReturn(msg) => LuaError::Conversion(msg),
                other => LuaError::Conversion(other.to_string()),
            })?
            .or_process_table(process_table)
            .with_environment(environment);
        Ok(outcome)
    }
}

impl ScriptEngine for LuaEngine {
    fn name(&self) -> &str {
        "lua"
    }

    fn execute(
        &self,
        script: &Script,
        bindings: BindingTable,
    ) -> Result<ScriptOutcome, ScriptFailure> {
        self.run(script, &bindings).map_err(|e| {
            debug!(path = %script.path(), code = e.code(), "lua execution failed");
            ScriptFailure::from(e)
        })
    }
}

fn sandboxed_vm() -> Result<Lua, LuaError> {
    let libs = StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::UTF8 | StdLib::COROUTINE;
    let lua = Lua::new_with(libs, LuaOptions::default())?;
    let globals = lua.globals();
    for name in STRIPPED_GLOBALS {
        globals.raw_set(*name, Value::Nil)?;
    }
    Ok(lua)
}

fn global_names(lua: &Lua) -> Result<HashSet<String>, LuaError> {
    let mut names = HashSet::new();
    for pair in lua.globals().pairs::<Value, Value>() {
        let (key, _) = pair?;
        if let Value::String(s) = key {
            names.insert(s.to_string_lossy());
        }
    }
    Ok(names)
}

fn install_values(lua: &Lua, bindings: &BindingTable) -> Result<(), LuaError> {
    let globals = lua.globals();
    for (name, value) in bindings.values() {
        globals.raw_set(name.as_str(), to_lua(lua, value)?)?;
    }
    Ok(())
}

/// Publishes every operation under its namespace table. Returns the
/// namespace names.
fn install_operations(lua: &Lua, bindings: &BindingTable) -> Result<Vec<String>, LuaError> {
    let globals = lua.globals();
    let mut namespaces = Vec::new();
    for (namespace, ops) in bindings.by_namespace() {
        let table = lua.create_table()?;
        for op in ops {
            let name = op.name();
            let op = op.clone();
            let func = lua.create_function(move |lua, args: MultiValue| {
                let args = args
                    .iter()
                    .map(from_lua)
                    .collect::<Result<Vec<BindingValue>, _>>()
                    .map_err(mlua::Error::external)?;
                trace!(op = %op.qualified_name(), "host call");
                let result = op.call(&args).map_err(mlua::Error::RuntimeError)?;
                to_lua(lua, &result).map_err(mlua::Error::external)
            })?;
            table.raw_set(name, func)?;
        }
        if namespace == "std" {
            let print: Value = table.raw_get("print")?;
            if !print.is_nil() {
                globals.raw_set("print", print)?;
            }
        }
        globals.raw_set(namespace, table)?;
        namespaces.push(namespace.to_string());
    }
    Ok(namespaces)
}

fn read_process_table(lua: &Lua) -> Result<Option<Table>, LuaError> {
    match from_lua(&lua.globals().raw_get::<Value>(PROCESS_TABLE_KEY)?)? {
        BindingValue::Table(table) => Ok(Some(table)),
        BindingValue::List(items) if items.is_empty() => Ok(Some(Table::new())),
        _ => Ok(None),
    }
}

fn capture_environment(
    lua: &Lua,
    builtin: &HashSet<String>,
    reserved: &HashSet<String>,
) -> Result<Table, LuaError> {
    let mut environment = Table::new();
    for pair in lua.globals().pairs::<Value, Value>() {
        let (key, value) = pair?;
        let Value::String(key) = key else { continue };
        let key = key.to_string_lossy();
        if builtin.contains(&key) || reserved.contains(&key) {
            continue;
        }
        match value {
            Value::Boolean(_)
            | Value::Integer(_)
            | Value::Number(_)
            | Value::String(_)
            | Value::Table(_) => match from_lua(&value) {
                Ok(converted) => {
                    environment.insert(key, converted);
                }
                Err(e) => debug!(global = %key, error = %e, "global not carried"),
            },
            _ => {}
        }
    }
    Ok(environment)
}

/// Comments out a leading `#!` line, keeping line numbers intact.
fn strip_shebang(source: &str) -> std::borrow::Cow<'_, str> {
    if source.starts_with("#!") {
        std::borrow::Cow::Owned(format!("--{source}"))
    } else {
        std::borrow::Cow::Borrowed(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shebang_is_commented_out() {
        assert_eq!(strip_shebang("#!/usr/bin/lua\nprint(1)"), "--#!/usr/bin/lua\nprint(1)");
        assert_eq!(strip_shebang("print(1)"), "print(1)");
    }

    #[test]
    fn sandbox_hides_host_access() {
        let lua = sandboxed_vm().expect("vm");
        let missing: bool = lua
            .load("return os == nil and io == nil and debug == nil and require == nil and load == nil and dofile == nil")
            .eval()
            .expect("eval");
        assert!(missing);
        let present: bool = lua
            .load("return string ~= nil and table ~= nil and math ~= nil and pcall ~= nil")
            .eval()
            .expect("eval");
        assert!(present);
    }

    #[test]
    fn from_config_copies_the_limit() {
        let engine = LuaEngine::from_config(&ScriptConfig {
            instruction_limit: 500,
        });
        assert_eq!(engine.instruction_limit(), 500);
        assert_eq!(engine.name(), "lua");
    }
}
