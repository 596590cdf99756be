//! Engine trait, inputs and results.

use super::{BindingTable, BindingValue, Table};
use crate::vfs::VfsPath;
use compsim_types::ErrorCode;
use thiserror::Error;

/// Source text of one file, addressed by its logical path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    path: VfsPath,
    source: String,
}

impl Script {
    /// Creates a script.
    #[must_use]
    pub fn new(path: VfsPath, source: impl Into<String>) -> Self {
        Self {
            path,
            source: source.into(),
        }
    }

    /// Logical path. Engines use it as the chunk name in error messages.
    #[must_use]
    pub fn path(&self) -> &VfsPath {
        &self.path
    }

    /// Source text.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }
}

/// Why an execution failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptFailure {
    /// The source did not compile.
    #[error("syntax error: {0}")]
    Syntax(String),

    /// The script raised an error while running.
    #[error("{0}")]
    Runtime(String),

    /// The script ran past the engine's instruction budget.
    #[error("instruction limit exceeded ({0})")]
    LimitExceeded(u64),

    /// The script returned a reserved key with the wrong shape.
    #[error("invalid return value: {0}")]
    InvalidReturn(String),

    /// The engine itself failed (VM setup, conversion).
    #[error("engine error: {0}")]
    Engine(String),
}

impl ErrorCode for ScriptFailure {
    fn code(&self) -> &'static str {
        match self {
            Self::Syntax(_) => "SCRIPT_SYNTAX",
            Self::Runtime(_) => "SCRIPT_FAILED",
            Self::LimitExceeded(_) => "SCRIPT_LIMIT_EXCEEDED",
            Self::InvalidReturn(_) => "SCRIPT_INVALID_RETURN",
            Self::Engine(_) => "SCRIPT_ENGINE",
        }
    }

    fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Engine(_))
    }
}

/// Reserved return keys reabsorbed by the runtime.
pub const GLOBALS_KEY: &str = "globals";
/// Reserved return key for the kernel table.
pub const KERNEL_TABLE_KEY: &str = "kernel_table";
/// Reserved return key (and global name) for the process table.
pub const PROCESS_TABLE_KEY: &str = "process_table";

/// Result of a successful execution.
///
/// The reserved keys of a returned table are split out into typed fields
/// so the runtime never has to inspect an untyped value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptOutcome {
    /// Raw return value, reserved keys included.
    pub returned: BindingValue,
    /// Replacement machine-global table.
    pub globals: Option<Table>,
    /// Replacement kernel table. Only honored for kernel-capable processes.
    pub kernel_table: Option<Table>,
    /// Replacement process table.
    pub process_table: Option<Table>,
    /// Plain data globals the script left behind, carried into the next
    /// run unless the process resets its bindings.
    pub environment: Table,
}

impl ScriptOutcome {
    /// Splits the reserved keys out of `returned`.
    ///
    /// Non-table return values carry no reserved keys.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptFailure::InvalidReturn`] if a reserved key is
    /// present but not a table.
    pub fn from_return(returned: BindingValue) -> Result<Self, ScriptFailure> {
        let mut outcome = Self::default();
        if let Some(table) = returned.as_table() {
            outcome.globals = reserved(table, GLOBALS_KEY)?;
            outcome.kernel_table = reserved(table, KERNEL_TABLE_KEY)?;
            outcome.process_table = reserved(table, PROCESS_TABLE_KEY)?;
        }
        outcome.returned = returned;
        Ok(outcome)
    }

    /// Sets the process table unless the return value already replaced it.
    #[must_use]
    pub fn or_process_table(mut self, table: Option<Table>) -> Self {
        if self.process_table.is_none() {
            self.process_table = table;
        }
        self
    }

    /// Sets the captured environment.
    #[must_use]
    pub fn with_environment(mut self, environment: Table) -> Self {
        self.environment = environment;
        self
    }
}

fn reserved(table: &Table, key: &str) -> Result<Option<Table>, ScriptFailure> {
    match table.get(key) {
        None | Some(BindingValue::Nil) => Ok(None),
        Some(BindingValue::Table(t)) => Ok(Some(t.clone())),
        Some(BindingValue::List(items)) if items.is_empty() => Ok(Some(Table::new())),
        Some(other) => Err(ScriptFailure::InvalidReturn(format!(
            "`{key}` must be a table, got {}",
            other.type_name()
        ))),
    }
}

/// Executes scripts against binding tables.
///
/// Implementations must be shareable across machine threads. Each call is
/// synchronous; a running call is never aborted from outside, so a killed
/// process only stops once its current call returns.
pub trait ScriptEngine: Send + Sync {
    /// Engine name for logs.
    fn name(&self) -> &str;

    /// Runs `script` with `bindings` exposed as globals.
    ///
    /// # Errors
    ///
    /// Returns a [`ScriptFailure`] describing what went wrong.
    fn execute(&self, script: &Script, bindings: BindingTable)
        -> Result<ScriptOutcome, ScriptFailure>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_return_has_no_reserved_parts() {
        let outcome = ScriptOutcome::from_return(BindingValue::Int(1)).expect("plain");
        assert_eq!(outcome.returned, BindingValue::Int(1));
        assert!(outcome.globals.is_none());
        assert!(outcome.process_table.is_none());
    }

    #[test]
    fn reserved_tables_are_split_out() {
        let returned = BindingValue::table([
            (
                GLOBALS_KEY,
                BindingValue::table([("motd", BindingValue::from("hi"))]),
            ),
            (PROCESS_TABLE_KEY, BindingValue::List(Vec::new())),
            ("other", BindingValue::Int(2)),
        ]);
        let outcome = ScriptOutcome::from_return(returned).expect("valid");
        let globals = outcome.globals.expect("globals present");
        assert_eq!(globals.get("motd"), Some(&BindingValue::from("hi")));
        assert_eq!(outcome.process_table, Some(Table::new()));
        assert!(outcome.kernel_table.is_none());
    }

    #[test]
    fn wrong_shape_is_rejected() {
        let returned = BindingValue::table([(KERNEL_TABLE_KEY, BindingValue::from("nope"))]);
        let err = ScriptOutcome::from_return(returned).expect_err("string kernel table");
        assert!(matches!(err, ScriptFailure::InvalidReturn(_)));
        assert_eq!(err.code(), "SCRIPT_INVALID_RETURN");
    }

    #[test]
    fn returned_process_table_wins() {
        let mut t = Table::new();
        t.insert("n".into(), BindingValue::Int(1));
        let returned = BindingValue::table([(PROCESS_TABLE_KEY, BindingValue::Table(t.clone()))]);
        let outcome = ScriptOutcome::from_return(returned)
            .expect("valid")
            .or_process_table(Some(Table::new()));
        assert_eq!(outcome.process_table, Some(t));
    }
}
