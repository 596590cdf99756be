//! Error types for the Lua engine.

use compsim_runtime::ScriptFailure;
use compsim_types::ErrorCode;
use thiserror::Error;

/// Errors raised while preparing or running a Lua chunk.
#[derive(Debug, Error)]
pub enum LuaError {
    /// Error reported by the Lua VM.
    #[error("lua error: {0}")]
    Runtime(#[from] mlua::Error),

    /// The chunk ran past the configured instruction budget.
    #[error("instruction limit exceeded ({0})")]
    LimitExceeded(u64),

    /// A value could not cross the Lua boundary.
    #[error("conversion failed: {0}")]
    Conversion(String),
}

impl ErrorCode for LuaError {
    fn code(&self) -> &'static str {
        match self {
            Self::Runtime(mlua::Error::SyntaxError { .. }) => "LUA_SYNTAX",
            Self::Runtime(_) => "LUA_RUNTIME",
            Self::LimitExceeded(_) => "LUA_LIMIT_EXCEEDED",
            Self::Conversion(_) => "LUA_CONVERSION",
        }
    }

    fn is_recoverable(&self) -> bool {
        true
    }
}

impl From<LuaError> for ScriptFailure {
    fn from(err: LuaError) -> Self {
        match err {
            LuaError::Runtime(mlua::Error::SyntaxError { message, .. }) => Self::Syntax(message),
            LuaError::Runtime(e) => Self::Runtime(format_lua_error(&e)),
            LuaError::LimitExceeded(limit) => Self::LimitExceeded(limit),
            LuaError::Conversion(msg) => Self::InvalidReturn(msg),
        }
    }
}

/// Formats an [`mlua::Error`] for display on a terminal.
///
/// Callback wrappers are unwound so the message a host operation raised is
/// shown as-is, with the Lua traceback dropped.
#[must_use]
pub fn format_lua_error(err: &mlua::Error) -> String {
    match err {
        mlua::Error::RuntimeError(msg) => strip_traceback(msg),
        mlua::Error::CallbackError { cause, .. } => format_lua_error(cause),
        mlua::Error::SyntaxError { message, .. } => message.clone(),
        mlua::Error::MemoryError(msg) => format!("out of memory: {msg}"),
        _ => strip_traceback(&err.to_string()),
    }
}

fn strip_traceback(msg: &str) -> String {
    match msg.find("\nstack traceback:") {
        Some(idx) => msg[..idx].to_string(),
        None => msg.to_string(),
    }
}
