//! Host path scrubbing for user-visible messages.
//!
//! Script errors are shown on a machine's terminal. Engines report them
//! with logical chunk names, but host errors bubbling through (I/O,
//! engine internals) can still mention absolute host locations. Every
//! message passes through a [`PathScrubber`] before display.
//!
//! ```text
//! /srv/compsim/machines/0_test/fs/boot/boot.lua:3: oops
//!                         ↓
//! /boot/boot.lua:3: oops
//! ```

use std::path::Path;

/// Removes known host prefixes from text.
#[derive(Debug, Clone, Default)]
pub struct PathScrubber {
    /// `(prefix, replacement)`, longest prefix first.
    rules: Vec<(String, String)>,
}

impl PathScrubber {
    /// Scrubber with no rules.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces `host` (and its canonical form) with `logical`.
    ///
    /// Rules are applied longest-prefix first, so a filesystem root nested
    /// inside a machine directory is matched before the machine directory.
    #[must_use]
    pub fn with_root(mut self, host: &Path, logical: &str) -> Self {
        let mut forms = vec![host.display().to_string()];
        if let Ok(canonical) = host.canonicalize() {
            let canonical = canonical.display().to_string();
            if !forms.contains(&canonical) {
                forms.push(canonical);
            }
        }
        for form in forms {
            let trimmed = form.trim_end_matches(['/', '\\']).to_string();
            if !trimmed.is_empty() {
                self.rules.push((trimmed, logical.to_string()));
            }
        }
        self.rules.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        self
    }

    /// Returns `message` with every host prefix replaced.
    ///
    /// A prefix followed by a separator keeps the separator, so
    /// `<fs root>/boot/x` with logical `""` becomes `/boot/x`; a bare
    /// prefix becomes the logical replacement or `/` if that is empty.
    #[must_use]
    pub fn scrub(&self, message: &str) -> String {
        let mut out = message.to_string();
        for (prefix, logical) in &self.rules {
            if !out.contains(prefix.as_str()) {
                continue;
            }
            let with_sep = format!("{prefix}/");
            out = out.replace(&with_sep, &format!("{logical}/"));
            let bare = if logical.is_empty() { "/" } else { logical.as_str() };
            out = out.replace(prefix.as_str(), bare);
        }
        out
    }
}
