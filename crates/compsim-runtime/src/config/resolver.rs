//! Override layer applied after loading.
//!
//! ```text
//! ConfigLoader.load()  →  SimConfig (base)
//!                              │
//!                     ConfigResolver.apply()
//!                              ▼
//!                         SimConfig (final)
//! ```

use super::SimConfig;

/// Applies overrides (typically CLI flags) to a loaded config.
pub trait ConfigResolver {
    /// Applies overrides. Unset options must leave the config unchanged.
    fn apply(&self, config: &mut SimConfig);
}

/// Resolver that changes nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpResolver;

impl ConfigResolver for NoOpResolver {
    fn apply(&self, _config: &mut SimConfig) {}
}
