//! Routing table of the layered storage.
//!
//! Every storage operation maps to one routing strategy. The table is the
//! whole cache policy of a plain layered storage: read from the nearest tier
//! that has the path, write to the nearest tier, destroy everywhere.

/// Storage operation kinds known to the layered storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Exists,
    Stat,
    IsDir,
    IsFile,
    Mtime,
    Permissions,
    MimeType,
    OpenRead,
    ReadAll,
    LocalFile,
    ETag,
    Metadata,
    Hash,
    MakeDirectory,
    WriteAll,
    OpenWrite,
    CopyFromStorage,
    MoveFromStorage,
    Delete,
    RemoveDirectory,
    Touch,
    VerifyPath,
    Lock,
    Rename,
    Copy,
    ListDirectory,
    HasUpdated,
    IsLocal,
    SelfTest,
    FreeSpace,
}

/// Which tiers an operation runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// First tier (lowest index) containing the path; not-found if none.
    FirstMatch,
    /// Every tier in order, results combined with logical AND.
    AllTiers,
    /// Every tier in order, results combined with logical OR.
    AnyTier,
    /// Every tier that currently contains the path.
    TiersWithPath,
    /// Tier 0 only.
    TierZero,
    /// The last (slowest, most capacious) tier only.
    LastTier,
    /// Every tier that can list the path, merged.
    Merged,
}

impl Operation {
    /// Routing strategy for this operation.
    ///
    /// Operations without an explicit entry go to the first tier that has
    /// the path.
    pub const fn route(self) -> Route {
        match self {
            Operation::MakeDirectory
            | Operation::WriteAll
            | Operation::OpenWrite
            | Operation::CopyFromStorage
            | Operation::MoveFromStorage => Route::TierZero,
            Operation::Delete
            | Operation::RemoveDirectory
            | Operation::Touch
            | Operation::VerifyPath
            | Operation::Lock
            | Operation::IsLocal
            | Operation::SelfTest => Route::AllTiers,
            Operation::HasUpdated => Route::AnyTier,
            Operation::Rename => Route::TiersWithPath,
            Operation::ListDirectory => Route::Merged,
            Operation::FreeSpace => Route::LastTier,
            _ => Route::FirstMatch,
        }
    }
}
