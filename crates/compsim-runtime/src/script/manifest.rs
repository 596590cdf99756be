//! Script requirement headers.
//!
//! A script may declare the namespaces it needs in its leading comment
//! block:
//!
//! ```lua
//! #!/usr/bin/env lua
//! --@requires std, fs
//! --@requires event
//! print("hello")
//! ```
//!
//! The header ends at the first line that is neither blank nor a comment.

const DIRECTIVE: &str = "--@requires";

/// Namespaces declared by `--@requires` lines, in order, without duplicates.
///
/// # Example
///
/// ```
/// use compsim_runtime::script::required_namespaces;
///
/// let src = "--@requires std, fs\n-- plain comment\n--@requires std event\nprint(1)\n--@requires late";
/// assert_eq!(required_namespaces(src), vec!["std", "fs", "event"]);
/// ```
#[must_use]
pub fn required_namespaces(source: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for (idx, line) in source.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || (idx == 0 && line.starts_with("#!")) {
            continue;
        }
        if let Some(rest) = line.strip_prefix(DIRECTIVE) {
            for ns in rest.split(|c: char| c == ',' || c.is_whitespace()) {
                if !ns.is_empty() && !out.iter().any(|n| n == ns) {
                    out.push(ns.to_string());
                }
            }
        } else if !line.starts_with("--") {
            break;
        }
    }
    out
}
