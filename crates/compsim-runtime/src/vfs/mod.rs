//! Per-machine virtual filesystem.
//!
//! Each machine owns one [`Vfs`]: an in-memory tree of folders and files
//! mirroring a machine-private host directory. Scripts only ever see
//! logical paths (`/boot/boot.lua`); the translation to host storage
//! happens inside this module and is never handed back out.
//!
//! # Layout
//!
//! ```text
//! <storage root>/machines/<designation>/fs/   ← host root (private)
//!                                      │
//! Vfs::root  "/" ──────────────────────┘
//!  ├── boot/
//!  │    └── boot.lua     (executable)
//!  └── home/
//!       └── notes.txt
//! ```
//!
//! # Resolution
//!
//! [`Vfs::resolve`] walks the tree segment by segment from the root. There
//! is no side index, so a resolve result always reflects the tree's
//! current shape.
//!
//! # Errors
//!
//! | Error | Code |
//! |-------|------|
//! | Missing segment | `VFS_NOT_FOUND` |
//! | Name already taken | `VFS_ALREADY_EXISTS` |
//! | Malformed or escaping path | `VFS_INVALID_PATH` |
//! | Host I/O failure | `VFS_IO` |

mod error;
mod node;
mod path;
mod tree;

pub use error::VfsError;
pub use node::{DirEntry, VfsNode, VirtualFile, VirtualFolder};
pub use path::VfsPath;
pub use tree::{SharedVfs, Vfs};
