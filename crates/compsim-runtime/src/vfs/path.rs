//! Logical paths.

use super::VfsError;
use std::fmt;

/// Normalized absolute logical path.
///
/// Stored as segments; `.` and empty segments are dropped and `..` pops,
/// failing if it would climb above `/`.
///
/// # Example
///
/// ```
/// use compsim_runtime::vfs::VfsPath;
///
/// let p = VfsPath::parse("/home//user/./docs/../notes.txt").unwrap();
/// assert_eq!(p.to_string(), "/home/user/notes.txt");
/// assert_eq!(p.file_name(), Some("notes.txt"));
/// assert!(VfsPath::parse("/../etc").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct VfsPath {
    segments: Vec<String>,
}

impl VfsPath {
    /// The root path `/`.
    #[must_use]
    pub fn root() -> Self {
        Self::default()
    }

    /// Parses a path. Relative input is taken relative to `/`.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::InvalidPath`] for NUL bytes or `..` above root.
    pub fn parse(path: &str) -> Result<Self, VfsError> {
        Self::root().resolve(path)
    }

    /// Resolves `path` against `self` as working directory.
    ///
    /// Absolute input ignores `self`.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::InvalidPath`] for NUL bytes or `..` above root.
    pub fn resolve(&self, path: &str) -> Result<Self, VfsError> {
        if path.contains('\0') {
            return Err(VfsError::InvalidPath(path.replace('\0', "\\0")));
        }
        let mut segments = if path.starts_with('/') {
            Vec::new()
        } else {
            self.segments.clone()
        };
        for part in path.split('/') {
            match part {
                "" | "." => continue,
                ".." => {
                    if segments.pop().is_none() {
                        return Err(VfsError::InvalidPath(format!(
                            "{path} escapes the root folder"
                        )));
                    }
                }
                name => segments.push(name.to_string()),
            }
        }
        Ok(Self { segments })
    }

    /// Appends one validated name.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::InvalidName`] if `name` is not a plain node name.
    pub fn join(&self, name: &str) -> Result<Self, VfsError> {
        validate_name(name)?;
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        Ok(Self { segments })
    }

    /// Path segments from the root.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Whether this is `/`.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Parent folder path; `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        let (_, rest) = self.segments.split_last()?;
        Some(Self {
            segments: rest.to_vec(),
        })
    }

    /// Last segment; `None` for the root.
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }
}

impl fmt::Display for VfsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        for seg in &self.segments {
            write!(f, "/{seg}")?;
        }
        Ok(())
    }
}

/// Checks that `name` can be a single node name.
///
/// # Errors
///
/// Returns [`VfsError::InvalidName`] for empty names, `.`, `..`, or names
/// containing separators or NUL.
pub(crate) fn validate_name(name: &str) -> Result<(), VfsError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if bad {
        Err(VfsError::InvalidName(name.replace('\0', "\\0")))
    } else {
        Ok(())
    }
}
