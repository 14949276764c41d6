//! Disk-backed memo of category membership and parentage.
//!
//! Entries are authoritative for the rest of the run once fetched; they are
//! only dropped by [`CategoryCache::rebuild`] or by starting a new process
//! without a snapshot.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use serde::{Deserialize, Serialize};

use crate::api::WikiReadApi;
use crate::title::CategoryTitle;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryContents {
    pub subcategories: Vec<CategoryTitle>,
    pub articles: Vec<String>,
}

impl CategoryContents {
    pub fn is_empty(&self) -> bool {
        self.subcategories.is_empty() && self.articles.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    contents: BTreeMap<CategoryTitle, CategoryContents>,
    parents: BTreeMap<CategoryTitle, Vec<CategoryTitle>>,
}

/// What happened when the snapshot file was read at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded { categories: usize },
    Missing,
    /// The file existed but could not be used; the cache starts empty.
    Discarded { reason: String },
}

#[derive(Debug)]
pub struct CategoryCache {
    path: PathBuf,
    snapshot: Snapshot,
}

impl CategoryCache {
    pub fn empty(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            snapshot: Snapshot {
                version: SNAPSHOT_VERSION,
                ..Snapshot::default()
            },
        }
    }

    /// Read the snapshot at `path`. Never fails: unreadable data yields an empty cache.
    pub fn load(path: &Path) -> (Self, LoadOutcome) {
        if !path.exists() {
            return (Self::empty(path), LoadOutcome::Missing);
        }
        match read_snapshot(path) {
            Ok(snapshot) => {
                let categories = snapshot.contents.len();
                tracing::info!(path = %path.display(), categories, "loaded category snapshot");
                (
                    Self {
                        path: path.to_path_buf(),
                        snapshot,
                    },
                    LoadOutcome::Loaded { categories },
                )
            }
            Err(error) => {
                tracing::warn!(path = %path.display(), "discarding category snapshot: {error:#}");
                (
                    Self::empty(path),
                    LoadOutcome::Discarded {
                        reason: format!("{error:#}"),
                    },
                )
            }
        }
    }

    pub fn rebuild(&mut self) {
        tracing::info!("discarding cached category data");
        self.snapshot.contents.clear();
        self.snapshot.parents.clear();
    }

    pub fn len(&self) -> usize {
        self.snapshot.contents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.contents.is_empty() && self.snapshot.parents.is_empty()
    }

    /// Direct members of `category`, fetched at most once per run.
    pub fn children<A: WikiReadApi + ?Sized>(
        &mut self,
        api: &mut A,
        category: &CategoryTitle,
    ) -> Result<&CategoryContents> {
        match self.snapshot.contents.entry(category.clone()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                tracing::debug!(%category, "fetching category members");
                let subcategories = api
                    .fetch_subcategories(category)
                    .with_context(|| format!("failed to list subcategories of {category}"))?;
                let articles = api
                    .fetch_articles(category)
                    .with_context(|| format!("failed to list articles of {category}"))?;
                Ok(entry.insert(CategoryContents {
                    subcategories,
                    articles,
                }))
            }
        }
    }

    /// Direct parents of `category`, fetched at most once per run.
    pub fn parents<A: WikiReadApi + ?Sized>(
        &mut self,
        api: &mut A,
        category: &CategoryTitle,
    ) -> Result<&[CategoryTitle]> {
        match self.snapshot.parents.entry(category.clone()) {
            Entry::Occupied(entry) => Ok(entry.into_mut().as_slice()),
            Entry::Vacant(entry) => {
                tracing::debug!(%category, "fetching parent categories");
                let parents = api
                    .fetch_parents(category.as_str())
                    .with_context(|| format!("failed to list parents of {category}"))?;
                Ok(entry.insert(parents).as_slice())
            }
        }
    }

    /// Overwrite the snapshot file with everything gathered so far.
    pub fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_vec(&self.snapshot).context("failed to serialize category snapshot")?;
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&json)
            .context("failed to compress category snapshot")?;
        let bytes = encoder
            .finish()
            .context("failed to finish category snapshot compression")?;

        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, bytes)
            .with_context(|| format!("failed to write {}", temp_path.display()))?;
        fs::rename(&temp_path, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        tracing::info!(
            path = %self.path.display(),
            categories = self.snapshot.contents.len(),
            "saved category snapshot"
        );
        Ok(())
    }
}

fn read_snapshot(path: &Path) -> Result<Snapshot> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let mut json = Vec::new();
    ZlibDecoder::new(bytes.as_slice())
        .read_to_end(&mut json)
        .context("failed to decompress category snapshot")?;
    let snapshot: Snapshot =
        serde_json::from_slice(&json).context("failed to decode category snapshot")?;
    if snapshot.version != SNAPSHOT_VERSION {
        bail!(
            "unsupported snapshot version {} (expected {SNAPSHOT_VERSION})",
            snapshot.version
        );
    }
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockWiki;
    use tempfile::tempdir;

    fn animals_wiki() -> MockWiki {
        MockWiki::new()
            .with_page("Category:Mammals", "[[Category:Animals]]")
            .with_page("Category:Birds", "[[Category:Animals]]")
            .with_page("Cat", "Meow.\n[[Category:Animals]]")
    }

    #[test]
    fn children_are_fetched_once_per_category() {
        let temp = tempdir().expect("tempdir");
        let mut api = animals_wiki();
        let mut cache = CategoryCache::empty(&temp.path().join("cache.gz"));
        let animals = CategoryTitle::new("Animals");

        let first = cache.children(&mut api, &animals).expect("children").clone();
        let second = cache.children(&mut api, &animals).expect("children").clone();

        assert_eq!(first, second);
        assert_eq!(
            first.subcategories,
            vec![CategoryTitle::new("Mammals"), CategoryTitle::new("Birds")]
        );
        assert_eq!(first.articles, vec!["Cat".to_string()]);
        assert_eq!(api.children_fetches.get(&animals), Some(&1));
    }

    #[test]
    fn parents_are_memoized() {
        let temp = tempdir().expect("tempdir");
        let mut api = animals_wiki();
        let mut cache = CategoryCache::empty(&temp.path().join("cache.gz"));
        let mammals = CategoryTitle::new("Mammals");

        let parents = cache.parents(&mut api, &mammals).expect("parents").to_vec();
        cache.parents(&mut api, &mammals).expect("parents");

        assert_eq!(parents, vec![CategoryTitle::new("Animals")]);
        assert_eq!(api.parent_fetches.get("Category:Mammals"), Some(&1));
    }

    #[test]
    fn persisted_snapshot_is_served_without_fetching() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("state").join("category.dump.gz");
        let animals = CategoryTitle::new("Animals");

        let mut api = animals_wiki();
        let mut cache = CategoryCache::empty(&path);
        cache.children(&mut api, &animals).expect("children");
        cache
            .parents(&mut api, &CategoryTitle::new("Birds"))
            .expect("parents");
        cache.persist().expect("persist");

        let (mut reloaded, outcome) = CategoryCache::load(&path);
        assert_eq!(outcome, LoadOutcome::Loaded { categories: 1 });
        let mut offline = MockWiki::new();
        let contents = reloaded.children(&mut offline, &animals).expect("children");
        assert_eq!(contents.articles, vec!["Cat".to_string()]);
        assert_eq!(offline.request_count(), 0);
    }

    #[test]
    fn corrupt_snapshot_starts_empty() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("category.dump.gz");
        fs::write(&path, b"definitely not zlib").expect("write");

        let (cache, outcome) = CategoryCache::load(&path);
        assert!(cache.is_empty());
        assert!(matches!(outcome, LoadOutcome::Discarded { .. }));
    }

    #[test]
    fn missing_snapshot_starts_empty() {
        let temp = tempdir().expect("tempdir");
        let (cache, outcome) = CategoryCache::load(&temp.path().join("absent.gz"));
        assert!(cache.is_empty());
        assert_eq!(outcome, LoadOutcome::Missing);
    }

    #[test]
    fn rebuild_forces_a_fresh_fetch() {
        let temp = tempdir().expect("tempdir");
        let mut api = animals_wiki();
        let mut cache = CategoryCache::empty(&temp.path().join("cache.gz"));
        let animals = CategoryTitle::new("Animals");

        cache.children(&mut api, &animals).expect("children");
        cache.rebuild();
        assert!(cache.is_empty());
        cache.children(&mut api, &animals).expect("children");
        assert_eq!(api.children_fetches.get(&animals), Some(&2));
    }
}
