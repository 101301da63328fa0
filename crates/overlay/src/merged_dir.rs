//! Directory listing that merges the listings of several tiers.

use std::collections::HashSet;

use tiercache_storage::{DirectoryListing, StorageError};

/// Merged, deduplicated listing over several directory listings.
///
/// Entries come in tier order: every unique name of the first listing in its
/// native order, then names of the second listing not seen yet, and so on.
/// A name present in several listings appears once, where the first listing
/// has it. `.` and `..` are never yielded.
pub struct MergedDirectory {
    listings: Vec<Box<dyn DirectoryListing>>,
    /// Index of the listing currently being read.
    active: usize,
    /// Names already yielded since construction or the last rewind.
    seen: HashSet<String>,
}

impl MergedDirectory {
    /// Merge listings, highest priority first.
    ///
    /// # Arguments
    /// * `listings` - Listings in tier order
    pub fn new(listings: Vec<Box<dyn DirectoryListing>>) -> Self {
        Self {
            listings,
            active: 0,
            seen: HashSet::new(),
        }
    }

    /// Number of merged listings.
    pub fn len(&self) -> usize {
        self.listings.len()
    }

    /// Whether no listing is merged.
    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }
}

impl DirectoryListing for MergedDirectory {
    fn next_entry(&mut self) -> Result<Option<String>, StorageError> {
        while let Some(listing) = self.listings.get_mut(self.active) {
            match listing.next_entry()? {
                None => self.active += 1,
                Some(name) if name == "." || name == ".." => continue,
                Some(name) => {
                    if self.seen.insert(name.clone()) {
                        return Ok(Some(name));
                    }
                }
            }
        }
        Ok(None)
    }

    fn rewind(&mut self) -> Result<(), StorageError> {
        for listing in self.listings.iter_mut() {
            listing.rewind()?;
        }
        self.active = 0;
        self.seen.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiercache_storage::{collect_entries, MemoryDirectory};

    fn merged(tiers: &[&[&str]]) -> MergedDirectory {
        let listings: Vec<Box<dyn DirectoryListing>> = tiers
            .iter()
            .map(|names| {
                Box::new(MemoryDirectory::new(names.iter().copied())) as Box<dyn DirectoryListing>
            })
            .collect();
        MergedDirectory::new(listings)
    }

    fn sorted(mut names: Vec<String>) -> Vec<String> {
        names.sort();
        names
    }

    /// (tiers, expected entries) pairs.
    fn cases() -> Vec<(Vec<&'static [&'static str]>, Vec<&'static str>)> {
        vec![
            (vec![&["foo", "bar"][..], &["asd"][..]], vec!["foo", "bar", "asd"]),
            (vec![&[][..], &[".", ".."][..], &["asd"][..]], vec!["asd"]),
            (vec![&["asd"][..], &["asd"][..]], vec!["asd"]),
            (vec![&["foo", "bar"][..], &[][..], &["foo", "bar"][..]], vec!["foo", "bar"]),
            (vec![&["a", "b"][..], &["c"][..], &["a", "c"][..]], vec!["a", "b", "c"]),
        ]
    }

    #[test]
    fn test_merged_entries() {
        for (tiers, expected) in cases() {
            let mut dir: MergedDirectory = merged(&tiers);
            let entries: Vec<String> = collect_entries(&mut dir).unwrap();
            assert_eq!(entries, expected, "tiers: {:?}", tiers);
        }
    }

    #[test]
    fn test_rewind_reproduces_entries() {
        for (tiers, expected) in cases() {
            let mut dir: MergedDirectory = merged(&tiers);
            dir.next_entry().unwrap();

            let rest: Vec<String> = collect_entries(&mut dir).unwrap();
            assert_ne!(sorted(rest), sorted(expected.iter().map(|s| s.to_string()).collect()));

            dir.rewind().unwrap();
            let entries: Vec<String> = collect_entries(&mut dir).unwrap();
            assert_eq!(entries, expected);
        }
    }

    #[test]
    fn test_first_tier_order_wins() {
        let mut dir: MergedDirectory = merged(&[&["z", "y"][..], &["a", "z"][..]]);

        let entries: Vec<String> = collect_entries(&mut dir).unwrap();
        assert_eq!(entries, vec!["z", "y", "a"]);
    }

    #[test]
    fn test_no_listings() {
        let mut dir = MergedDirectory::new(Vec::new());

        assert!(dir.is_empty());
        assert_eq!(dir.next_entry().unwrap(), None);
    }

    #[test]
    fn test_exhausted_stays_exhausted() {
        let mut dir: MergedDirectory = merged(&[&["a"][..]]);

        assert_eq!(dir.next_entry().unwrap(), Some("a".to_string()));
        assert_eq!(dir.next_entry().unwrap(), None);
        assert_eq!(dir.next_entry().unwrap(), None);
    }
}
