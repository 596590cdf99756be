//! The filesystem tree and its host mirror.

use super::node::{DirEntry, VfsNode, VirtualFile, VirtualFolder};
use super::path::{validate_name, VfsPath};
use super::VfsError;
use crate::script::Script;
use parking_lot::RwLock;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Filesystem shared between the processes of one machine.
///
/// Readers take the read lock for a single operation; every mutation takes
/// the write lock, giving one writer at a time.
pub type SharedVfs = Arc<RwLock<Vfs>>;

/// Extension marking a file as an executable script on scan.
const SCRIPT_EXTENSION: &str = ".lua";

fn is_script_name(name: &str) -> bool {
    name.ends_with(SCRIPT_EXTENSION)
}

/// A machine's filesystem.
#[derive(Debug)]
pub struct Vfs {
    host_root: PathBuf,
    root: VfsNode,
}

impl Vfs {
    /// Opens the filesystem rooted at `host_root`, creating the directory
    /// if needed and scanning its contents into the tree.
    ///
    /// Symlinks and special files are skipped so the tree can never point
    /// outside `host_root`.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::Io`] if the directory cannot be created or read.
    pub fn open(host_root: impl Into<PathBuf>) -> Result<Self, VfsError> {
        let host_root = host_root.into();
        fs::create_dir_all(&host_root).map_err(|e| VfsError::io("/", e))?;
        let mut root = VirtualFolder::new(String::new(), VfsPath::root(), host_root.clone());
        scan_folder(&mut root)?;
        debug!(files = count_nodes(&root), "scanned virtual filesystem");
        Ok(Self {
            host_root,
            root: VfsNode::Folder(root),
        })
    }

    /// Discards the tree and scans the host directory again.
    ///
    /// Executable flags set at runtime are lost; `.lua` files are marked
    /// executable again.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::Io`] if the host directory cannot be read.
    pub fn rescan(&mut self) -> Result<(), VfsError> {
        let mut root = VirtualFolder::new(String::new(), VfsPath::root(), self.host_root.clone());
        scan_folder(&mut root)?;
        self.root = VfsNode::Folder(root);
        Ok(())
    }

    /// Root folder.
    #[must_use]
    pub fn root(&self) -> &VfsNode {
        &self.root
    }

    /// Walks `path` from the root.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::NotFound`] if any segment is absent or a
    /// non-final segment is a file.
    pub fn resolve(&self, path: &VfsPath) -> Result<&VfsNode, VfsError> {
        let mut node = &self.root;
        for seg in path.segments() {
            node = match node {
                VfsNode::Folder(folder) => folder
                    .children
                    .get(seg)
                    .ok_or_else(|| VfsError::NotFound(path.to_string()))?,
                VfsNode::File(_) => return Err(VfsError::NotFound(path.to_string())),
            };
        }
        Ok(node)
    }

    /// Parses and resolves a string path.
    ///
    /// # Errors
    ///
    /// See [`VfsPath::parse`] and [`resolve`](Self::resolve).
    pub fn resolve_str(&self, path: &str) -> Result<&VfsNode, VfsError> {
        self.resolve(&VfsPath::parse(path)?)
    }

    /// Whether `path` resolves to anything.
    #[must_use]
    pub fn exists(&self, path: &VfsPath) -> bool {
        self.resolve(path).is_ok()
    }

    /// Resolves `path` to a file.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::NotFound`] or [`VfsError::NotAFile`].
    pub fn file(&self, path: &VfsPath) -> Result<&VirtualFile, VfsError> {
        self.resolve(path)?
            .as_file()
            .ok_or_else(|| VfsError::NotAFile(path.to_string()))
    }

    fn folder_mut(&mut self, path: &VfsPath) -> Result<&mut VirtualFolder, VfsError> {
        let mut folder = match &mut self.root {
            VfsNode::Folder(root) => root,
            VfsNode::File(_) => return Err(VfsError::RootImmutable),
        };
        for seg in path.segments() {
            folder = match folder.children.get_mut(seg) {
                Some(VfsNode::Folder(next)) => next,
                Some(VfsNode::File(_)) => return Err(VfsError::NotAFolder(path.to_string())),
                None => return Err(VfsError::NotFound(path.to_string())),
            };
        }
        Ok(folder)
    }

    /// Creates an empty file in `parent`.
    ///
    /// # Arguments
    ///
    /// * `parent` - Existing folder
    /// * `name` - New file name
    /// * `executable` - Initial executable flag
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::AlreadyExists`] if the name is taken, or a
    /// lookup/I-O error.
    pub fn create_file(
        &mut self,
        parent: &VfsPath,
        name: &str,
        executable: bool,
    ) -> Result<VirtualFile, VfsError> {
        let path = parent.join(name)?;
        let folder = self.folder_mut(parent)?;
        if folder.children.contains_key(name) {
            return Err(VfsError::AlreadyExists(path.to_string()));
        }
        let backing = folder.backing().join(name);
        fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&backing)
            .map_err(|e| VfsError::io(&path, e))?;
        let file = VirtualFile::new(name.to_string(), path, backing, executable);
        folder
            .children
            .insert(name.to_string(), VfsNode::File(file.clone()));
        debug!(path = %file.path(), executable, "created file");
        Ok(file)
    }

    /// Creates an empty folder in `parent` and returns its path.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::AlreadyExists`] if the name is taken, or a
    /// lookup/I-O error.
    pub fn create_folder(&mut self, parent: &VfsPath, name: &str) -> Result<VfsPath, VfsError> {
        let path = parent.join(name)?;
        let folder = self.folder_mut(parent)?;
        if folder.children.contains_key(name) {
            return Err(VfsError::AlreadyExists(path.to_string()));
        }
        let backing = folder.backing().join(name);
        fs::create_dir(&backing).map_err(|e| VfsError::io(&path, e))?;
        folder.children.insert(
            name.to_string(),
            VfsNode::Folder(VirtualFolder::new(name.to_string(), path.clone(), backing)),
        );
        Ok(path)
    }

    /// Creates `path` and any missing ancestors.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::NotAFolder`] if an ancestor is a file.
    pub fn create_dir_all(&mut self, path: &VfsPath) -> Result<(), VfsError> {
        let mut current = VfsPath::root();
        for seg in path.segments() {
            let next = current.join(seg)?;
            let is_folder = self.resolve(&next).map(VfsNode::is_folder).ok();
            match is_folder {
                Some(true) => {}
                Some(false) => return Err(VfsError::NotAFolder(next.to_string())),
                None => {
                    self.create_folder(&current, seg)?;
                }
            }
            current = next;
        }
        Ok(())
    }

    /// Reads a file as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns a lookup error or [`VfsError::Io`].
    pub fn read_file(&self, path: &VfsPath) -> Result<String, VfsError> {
        let file = self.file(path)?;
        fs::read_to_string(file.backing()).map_err(|e| VfsError::io(path, e))
    }

    /// Writes `contents` to a file, creating it if the parent exists.
    ///
    /// New files ending in `.lua` are marked executable.
    ///
    /// # Errors
    ///
    /// Returns a lookup error if the parent is missing, or [`VfsError::Io`].
    pub fn write_file(&mut self, path: &VfsPath, contents: &str) -> Result<(), VfsError> {
        let existing = match self.resolve(path) {
            Ok(VfsNode::File(file)) => Some(file.backing().to_path_buf()),
            Ok(VfsNode::Folder(_)) => return Err(VfsError::NotAFile(path.to_string())),
            Err(_) => None,
        };
        let backing = match existing {
            Some(backing) => backing,
            None => {
                let (parent, name) = split_parent(path)?;
                let file = self.create_file(&parent, name, is_script_name(name))?;
                file.backing().to_path_buf()
            }
        };
        fs::write(&backing, contents).map_err(|e| VfsError::io(path, e))
    }

    /// Lists a folder's children in name order.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::NotFound`] or [`VfsError::NotAFolder`].
    pub fn list(&self, path: &VfsPath) -> Result<Vec<DirEntry>, VfsError> {
        match self.resolve(path)? {
            VfsNode::Folder(folder) => Ok(folder.children().map(VfsNode::entry).collect()),
            VfsNode::File(_) => Err(VfsError::NotAFolder(path.to_string())),
        }
    }

    /// Removes a file or a whole folder, on the host and in the tree.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::RootImmutable`] for `/`, a lookup error, or
    /// [`VfsError::Io`]. The tree is untouched when the host removal fails.
    pub fn remove(&mut self, path: &VfsPath) -> Result<(), VfsError> {
        let (parent, name) = split_parent(path)?;
        match self.resolve(path)? {
            VfsNode::File(file) => fs::remove_file(file.backing()),
            VfsNode::Folder(folder) => fs::remove_dir_all(folder.backing()),
        }
        .map_err(|e| VfsError::io(path, e))?;
        self.folder_mut(&parent)?.children.remove(name);
        debug!(path = %path, "removed node");
        Ok(())
    }

    /// Sets a file's executable flag.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::NotFound`] or [`VfsError::NotAFile`].
    pub fn set_executable(&mut self, path: &VfsPath, executable: bool) -> Result<(), VfsError> {
        let (parent, name) = split_parent(path)?;
        match self.folder_mut(&parent)?.children.get_mut(name) {
            Some(VfsNode::File(file)) => {
                file.set_executable(executable);
                Ok(())
            }
            Some(VfsNode::Folder(_)) => Err(VfsError::NotAFile(path.to_string())),
            None => Err(VfsError::NotFound(path.to_string())),
        }
    }

    /// Loads a file's source for execution.
    ///
    /// The returned [`Script`] carries the logical path only.
    ///
    /// # Errors
    ///
    /// Returns [`VfsError::NotFound`]/[`VfsError::NotAFile`] when there is
    /// nothing to execute, or [`VfsError::Io`].
    pub fn load_script(&self, path: &VfsPath) -> Result<Script, VfsError> {
        let source = self.read_file(path)?;
        Ok(Script::new(path.clone(), source))
    }

    pub(crate) fn host_root(&self) -> &Path {
        &self.host_root
    }
}

fn split_parent(path: &VfsPath) -> Result<(VfsPath, &str), VfsError> {
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => Ok((parent, name)),
        _ => Err(VfsError::RootImmutable),
    }
}

fn scan_folder(folder: &mut VirtualFolder) -> Result<(), VfsError> {
    let logical = folder.path().clone();
    let entries = fs::read_dir(folder.backing()).map_err(|e| VfsError::io(&logical, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| VfsError::io(&logical, e))?;
        let Ok(name) = entry.file_name().into_string() else {
            debug!(folder = %logical, "skipping host entry with non UTF-8 name");
            continue;
        };
        if validate_name(&name).is_err() {
            continue;
        }
        let file_type = entry.file_type().map_err(|e| VfsError::io(&logical, e))?;
        let path = logical.join(&name)?;
        if file_type.is_dir() {
            let mut child = VirtualFolder::new(name.clone(), path, entry.path());
            scan_folder(&mut child)?;
            folder.children.insert(name, VfsNode::Folder(child));
        } else if file_type.is_file() {
            let executable = is_script_name(&name);
            let file = VirtualFile::new(name.clone(), path, entry.path(), executable);
            folder.children.insert(name, VfsNode::File(file));
        } else {
            debug!(path = %path, "skipping symlink or special file");
        }
    }
    Ok(())
}

fn count_nodes(folder: &VirtualFolder) -> usize {
    folder
        .children()
        .map(|child| match child {
            VfsNode::File(_) => 1,
            VfsNode::Folder(sub) => 1 + count_nodes(sub),
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, Vfs) {
        let dir = TempDir::new().expect("create temp dir");
        let vfs = Vfs::open(dir.path().join("fs")).expect("open vfs");
        (dir, vfs)
    }

    fn p(s: &str) -> VfsPath {
        VfsPath::parse(s).expect("valid path")
    }

    #[test]
    fn create_then_resolve_returns_same_file() {
        let (_dir, mut vfs) = open_temp();
        vfs.create_folder(&VfsPath::root(), "boot").expect("mkdir");
        let created = vfs
            .create_file(&p("/boot"), "boot.lua", true)
            .expect("create");
        let node = vfs.resolve(&p("/boot/boot.lua")).expect("resolve");
        assert_eq!(node.as_file(), Some(&created));
        assert!(created.is_executable());
    }

    #[test]
    fn missing_segment_is_not_found() {
        let (_dir, vfs) = open_temp();
        let err = vfs.resolve(&p("/nope/file")).expect_err("missing");
        assert!(matches!(err, VfsError::NotFound(ref s) if s == "/nope/file"));
    }

    #[test]
    fn walking_through_file_is_not_found() {
        let (_dir, mut vfs) = open_temp();
        vfs.create_file(&VfsPath::root(), "a", false).expect("create");
        assert!(vfs.resolve(&p("/a/b")).expect_err("through file").is_not_found());
    }

    #[test]
    fn duplicate_names_are_refused() {
        let (_dir, mut vfs) = open_temp();
        vfs.create_file(&VfsPath::root(), "x", false).expect("first");
        assert!(matches!(
            vfs.create_file(&VfsPath::root(), "x", false),
            Err(VfsError::AlreadyExists(_))
        ));
        assert!(matches!(
            vfs.create_folder(&VfsPath::root(), "x"),
            Err(VfsError::AlreadyExists(_))
        ));
    }

    #[test]
    fn write_read_and_list() {
        let (_dir, mut vfs) = open_temp();
        vfs.create_dir_all(&p("/home/user")).expect("mkdir -p");
        vfs.write_file(&p("/home/user/notes.txt"), "hello")
            .expect("write");
        vfs.write_file(&p("/home/user/run.lua"), "print('x')")
            .expect("write script");
        assert_eq!(
            vfs.read_file(&p("/home/user/notes.txt")).expect("read"),
            "hello"
        );

        let listing = vfs.list(&p("/home/user")).expect("list");
        let names: Vec<_> = listing.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["notes.txt", "run.lua"]);
        assert!(!listing[0].executable);
        assert!(listing[1].executable);
    }

    #[test]
    fn write_into_missing_folder_fails() {
        let (_dir, mut vfs) = open_temp();
        let err = vfs
            .write_file(&p("/missing/file.txt"), "x")
            .expect_err("no parent");
        assert!(err.is_not_found());
    }

    #[test]
    fn scan_picks_up_host_files() {
        let dir = TempDir::new().expect("create temp dir");
        let root = dir.path().join("fs");
        std::fs::create_dir_all(root.join("boot")).expect("host mkdir");
        std::fs::write(root.join("boot/boot.lua"), "return 1").expect("host write");
        std::fs::write(root.join("readme"), "hi").expect("host write");

        let vfs = Vfs::open(&root).expect("open");
        let boot = vfs.file(&p("/boot/boot.lua")).expect("boot script");
        assert!(boot.is_executable());
        assert!(!vfs.file(&p("/readme")).expect("readme").is_executable());
        let script = vfs.load_script(&p("/boot/boot.lua")).expect("load");
        assert_eq!(script.source(), "return 1");
        assert_eq!(script.path().to_string(), "/boot/boot.lua");
    }

    #[test]
    fn remove_deletes_on_host_and_in_tree() {
        let (dir, mut vfs) = open_temp();
        vfs.create_dir_all(&p("/tmp/deep")).expect("mkdir");
        vfs.write_file(&p("/tmp/deep/f"), "x").expect("write");
        vfs.remove(&p("/tmp")).expect("remove");
        assert!(!vfs.exists(&p("/tmp")));
        assert!(!dir.path().join("fs/tmp").exists());
        assert!(matches!(
            vfs.remove(&VfsPath::root()),
            Err(VfsError::RootImmutable)
        ));
    }

    #[test]
    fn errors_never_mention_host_root() {
        let (dir, vfs) = open_temp();
        let host = dir.path().display().to_string();
        let err = vfs.read_file(&p("/boot/missing.lua")).expect_err("missing");
        assert!(!err.to_string().contains(&host));
    }

    #[test]
    fn set_executable_toggles_flag() {
        let (_dir, mut vfs) = open_temp();
        vfs.create_file(&VfsPath::root(), "tool", false).expect("create");
        vfs.set_executable(&p("/tool"), true).expect("chmod");
        assert!(vfs.file(&p("/tool")).expect("file").is_executable());
    }

    mod proptest_tree {
        use super::*;
        use proptest::prelude::*;

        fn name() -> impl Strategy<Value = String> {
            "[a-z][a-z0-9_]{0,7}"
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(32))]

            #[test]
            fn created_nodes_resolve_to_themselves(
                folders in proptest::collection::vec(name(), 1..4),
                files in proptest::collection::btree_set(name(), 1..6),
            ) {
                let (_dir, mut vfs) = open_temp();
                let mut parent = VfsPath::root();
                for folder in &folders {
                    let next = parent.join(folder).expect("valid name");
                    if !vfs.exists(&next) {
                        vfs.create_folder(&parent, folder).expect("mkdir");
                    }
                    parent = next;
                }
                let mut created = Vec::new();
                for file in &files {
                    if vfs.exists(&parent.join(file).expect("valid name")) {
                        continue;
                    }
                    created.push(vfs.create_file(&parent, file, false).expect("create"));
                }
                for file in &created {
                    let node = vfs.resolve(file.path()).expect("resolve");
                    prop_assert_eq!(node.as_file(), Some(file));
                }
            }
        }
    }
}
