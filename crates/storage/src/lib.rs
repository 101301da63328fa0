//! Storage capability for tiercache.
//!
//! This crate defines the interface every storage tier implements and a
//! directory-backed implementation:
//!
//! - **`Storage`** - existence, stat, streams, whole-file IO, directory
//!   listing, rename/copy/delete, cross-storage copy and path locks
//! - **`FileStream`** / **`DirectoryListing`** - scoped stream and listing
//!   handles returned by a storage
//! - **`LocalStorage`** - storage rooted at a local (or network-mounted)
//!   directory
//!
//! # Example
//!
//! ```ignore
//! use tiercache_storage::{LocalStorage, Storage};
//!
//! let storage = LocalStorage::new("/srv/cache")?;
//! storage.write_all("docs/readme.txt", b"hello")?;
//! assert_eq!(storage.read_all("docs/readme.txt")?, Some(b"hello".to_vec()));
//! ```

mod directory;
mod error;
mod local;
pub mod path;
mod stream;
mod traits;
mod types;

pub use directory::MemoryDirectory;
pub use error::StorageError;
pub use local::{LocalStorage, LOCAL_CAPABILITY};
pub use stream::{LocalFileStream, MemoryStream};
pub use traits::{collect_entries, DirectoryListing, FileStream, Storage};
pub use types::{
    mime_type_for, FileKind, FileMetadata, FileStat, HashAlgorithm, LockType, OpenMode,
    Permissions, DIRECTORY_MIME_TYPE,
};
