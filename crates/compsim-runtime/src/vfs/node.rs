//! Tree nodes.

use super::VfsPath;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A file in the tree.
///
/// Holds its logical path and a private reference to the backing host file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualFile {
    name: String,
    path: VfsPath,
    backing: PathBuf,
    executable: bool,
}

impl VirtualFile {
    pub(crate) fn new(name: String, path: VfsPath, backing: PathBuf, executable: bool) -> Self {
        Self {
            name,
            path,
            backing,
            executable,
        }
    }

    /// File name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Logical path.
    #[must_use]
    pub fn path(&self) -> &VfsPath {
        &self.path
    }

    /// Whether the file is marked executable.
    #[must_use]
    pub fn is_executable(&self) -> bool {
        self.executable
    }

    pub(crate) fn set_executable(&mut self, executable: bool) {
        self.executable = executable;
    }

    pub(crate) fn backing(&self) -> &Path {
        &self.backing
    }
}

/// A folder and its children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualFolder {
    name: String,
    path: VfsPath,
    backing: PathBuf,
    pub(crate) children: BTreeMap<String, VfsNode>,
}

impl VirtualFolder {
    pub(crate) fn new(name: String, path: VfsPath, backing: PathBuf) -> Self {
        Self {
            name,
            path,
            backing,
            children: BTreeMap::new(),
        }
    }

    /// Folder name; empty for the root.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Logical path.
    #[must_use]
    pub fn path(&self) -> &VfsPath {
        &self.path
    }

    /// Child lookup by name.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&VfsNode> {
        self.children.get(name)
    }

    /// Children in name order.
    pub fn children(&self) -> impl Iterator<Item = &VfsNode> {
        self.children.values()
    }

    /// Number of direct children.
    #[must_use]
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Whether the folder has no children.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub(crate) fn backing(&self) -> &Path {
        &self.backing
    }
}

/// A node: file or folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VfsNode {
    File(VirtualFile),
    Folder(VirtualFolder),
}

impl VfsNode {
    /// Node name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::File(f) => f.name(),
            Self::Folder(d) => d.name(),
        }
    }

    /// Logical path.
    #[must_use]
    pub fn path(&self) -> &VfsPath {
        match self {
            Self::File(f) => f.path(),
            Self::Folder(d) => d.path(),
        }
    }

    /// Returns the file, if this is one.
    #[must_use]
    pub fn as_file(&self) -> Option<&VirtualFile> {
        match self {
            Self::File(f) => Some(f),
            Self::Folder(_) => None,
        }
    }

    /// Returns the folder, if this is one.
    #[must_use]
    pub fn as_folder(&self) -> Option<&VirtualFolder> {
        match self {
            Self::Folder(d) => Some(d),
            Self::File(_) => None,
        }
    }

    /// Whether this is a folder.
    #[must_use]
    pub fn is_folder(&self) -> bool {
        matches!(self, Self::Folder(_))
    }

    pub(crate) fn entry(&self) -> DirEntry {
        match self {
            Self::File(f) => DirEntry {
                name: f.name.clone(),
                is_folder: false,
                executable: f.executable,
            },
            Self::Folder(d) => DirEntry {
                name: d.name.clone(),
                is_folder: true,
                executable: false,
            },
        }
    }
}

/// One line of a folder listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_folder: bool,
    pub executable: bool,
}
