//! Binding tables and capability-gated host operations.

use super::{BindingValue, Table};
use compsim_auth::CapabilitySet;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Signature of a host operation body.
///
/// Errors are plain messages; engines raise them as script errors.
pub type HostFn = dyn Fn(&[BindingValue]) -> Result<BindingValue, String> + Send + Sync;

/// A named function exposed to scripts under a namespace.
///
/// Every call first checks the capability set captured when the binding
/// table was built. A denied call never reaches the body.
#[derive(Clone)]
pub struct HostOperation {
    namespace: &'static str,
    name: &'static str,
    gate: Arc<CapabilitySet>,
    func: Arc<HostFn>,
}

impl HostOperation {
    /// Creates an operation.
    ///
    /// # Arguments
    ///
    /// * `namespace` - Library the operation belongs to (`"std"`, `"fs"`, ...)
    /// * `name` - Function name within the namespace
    /// * `gate` - Capability set checked on every call
    /// * `func` - Body
    #[must_use]
    pub fn new<F>(namespace: &'static str, name: &'static str, gate: Arc<CapabilitySet>, func: F) -> Self
    where
        F: Fn(&[BindingValue]) -> Result<BindingValue, String> + Send + Sync + 'static,
    {
        Self {
            namespace,
            name,
            gate,
            func: Arc::new(func),
        }
    }

    /// Namespace.
    #[must_use]
    pub fn namespace(&self) -> &'static str {
        self.namespace
    }

    /// Function name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// `namespace.name`.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }

    /// Whether the gate currently allows this operation.
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        self.gate.allows_namespace(self.namespace)
    }

    /// Checks the gate, then runs the body.
    ///
    /// # Errors
    ///
    /// Returns the permission-denied message, or the body's error.
    pub fn call(&self, args: &[BindingValue]) -> Result<BindingValue, String> {
        self.gate
            .check_namespace(self.namespace, &self.qualified_name())
            .map_err(|e| e.to_string())?;
        (self.func)(args)
    }
}

impl fmt::Debug for HostOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostOperation")
            .field("namespace", &self.namespace)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Names and values exposed to one script execution.
#[derive(Debug, Clone, Default)]
pub struct BindingTable {
    values: Table,
    operations: Vec<HostOperation>,
}

impl BindingTable {
    /// Empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a global value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<BindingValue>) {
        self.values.insert(name.into(), value.into());
    }

    /// Global value by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&BindingValue> {
        self.values.get(name)
    }

    /// All global values.
    #[must_use]
    pub fn values(&self) -> &Table {
        &self.values
    }

    /// Adds an operation.
    pub fn add_operation(&mut self, op: HostOperation) {
        self.operations.push(op);
    }

    /// All operations in insertion order.
    #[must_use]
    pub fn operations(&self) -> &[HostOperation] {
        &self.operations
    }

    /// Operations grouped by namespace, each group in insertion order.
    #[must_use]
    pub fn by_namespace(&self) -> BTreeMap<&'static str, Vec<&HostOperation>> {
        let mut groups: BTreeMap<&'static str, Vec<&HostOperation>> = BTreeMap::new();
        for op in &self.operations {
            groups.entry(op.namespace()).or_default().push(op);
        }
        groups
    }

    /// Finds an operation by `namespace.name`.
    #[must_use]
    pub fn operation(&self, qualified: &str) -> Option<&HostOperation> {
        let (ns, name) = qualified.split_once('.')?;
        self.operations
            .iter()
            .find(|op| op.namespace() == ns && op.name() == name)
    }
}
