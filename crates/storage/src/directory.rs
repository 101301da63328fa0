//! Vector-backed directory listing.

use crate::error::StorageError;
use crate::traits::DirectoryListing;

/// Directory listing over a fixed list of names.
///
/// Entries are yielded verbatim, including any `.`/`..` entries the list
/// contains.
#[derive(Debug, Clone, Default)]
pub struct MemoryDirectory {
    entries: Vec<String>,
    position: usize,
}

impl MemoryDirectory {
    /// Create a listing over the given names.
    ///
    /// # Arguments
    /// * `entries` - Entry names in listing order
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: entries.into_iter().map(Into::into).collect(),
            position: 0,
        }
    }
}

impl DirectoryListing for MemoryDirectory {
    fn next_entry(&mut self) -> Result<Option<String>, StorageError> {
        let entry: Option<String> = self.entries.get(self.position).cloned();
        if entry.is_some() {
            self.position += 1;
        }
        Ok(entry)
    }

    fn rewind(&mut self) -> Result<(), StorageError> {
        self.position = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::collect_entries;

    #[test]
    fn test_listing_order_and_exhaustion() {
        let mut dir = MemoryDirectory::new(["b", "a"]);

        assert_eq!(dir.next_entry().unwrap(), Some("b".to_string()));
        assert_eq!(dir.next_entry().unwrap(), Some("a".to_string()));
        assert_eq!(dir.next_entry().unwrap(), None);
        assert_eq!(dir.next_entry().unwrap(), None);
    }

    #[test]
    fn test_rewind() {
        let mut dir = MemoryDirectory::new(["a", "b"]);
        dir.next_entry().unwrap();
        dir.next_entry().unwrap();

        dir.rewind().unwrap();

        assert_eq!(dir.next_entry().unwrap(), Some("a".to_string()));
    }

    #[test]
    fn test_collect_entries_skips_dots() {
        let mut dir = MemoryDirectory::new([".", "..", "foo"]);

        let entries: Vec<String> = collect_entries(&mut dir).unwrap();
        assert_eq!(entries, vec!["foo".to_string()]);
    }
}
