//! Lua script engine for compsim processes.
//!
//! Implements the runtime's [`ScriptEngine`](compsim_runtime::ScriptEngine)
//! on top of `mlua` (Lua 5.4):
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ ProcessRuntime::execute                      │
//! │   BindingTable { values, operations }        │
//! └───────────────┬──────────────────────────────┘
//!                 ▼
//! ┌──────────────────────────────────────────────┐
//! │ LuaEngine (fresh sandboxed VM per call)      │
//! │   values     → globals                       │
//! │   operations → std.print, fs.read, ...       │
//! │   chunk "=/bin/x.lua" → eval                 │
//! └───────────────┬──────────────────────────────┘
//!                 ▼
//!   ScriptOutcome { returned, globals, kernel_table,
//!                   process_table, environment }
//! ```
//!
//! # Example Lua Script
//!
//! ```lua
//! --@requires std, fs
//! local names = fs.list("/bin")
//! for _, entry in ipairs(names) do
//!     print(entry.name)
//! end
//! runs = (runs or 0) + 1          -- carried into the next run
//! return { process_table = { last = #names } }
//! ```

mod convert;
mod engine;
mod error;

pub use convert::{from_lua, map_to_lua, to_lua, MAX_DEPTH};
pub use engine::LuaEngine;
pub use error::{format_lua_error, LuaError};
