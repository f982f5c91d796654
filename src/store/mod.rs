//! Lifecycle store for digest articles.
//!
//! The store owns an in-memory copy of the article collection and the
//! last-search record and keeps it synchronized with a [`StorageBackend`].
//! The in-memory copy is a cache rebuilt from storage on every read, except
//! after a failed write: from then on memory is authoritative until a write
//! succeeds again.

mod backend;

pub use backend::{JsonFileBackend, MemoryBackend, StorageBackend, ARTICLES_FILE, LAST_SEARCH_FILE};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::StoreConfig;
use crate::models::{Article, LastSearchRecord, SearchRun, RETENTION_DAYS};
use crate::utils::url_key;

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Corrupt store: {0}")]
    Corrupt(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Cap, retention and search interval
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoreSettings {
    pub max_articles: usize,
    pub retention: Duration,
    pub search_interval: Duration,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            max_articles: 15,
            retention: Duration::days(RETENTION_DAYS),
            search_interval: Duration::days(7),
        }
    }
}

impl From<&StoreConfig> for StoreSettings {
    fn from(config: &StoreConfig) -> Self {
        Self {
            max_articles: config.max_articles.max(1),
            retention: Duration::days(config.retention_days.max(1)),
            search_interval: Duration::days(config.search_interval_days.max(1)),
        }
    }
}

/// What a merge did to the stored collection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeSummary {
    /// New articles now in the store
    pub added: usize,
    /// New articles dropped because their URL was already known
    pub duplicates: usize,
    /// Stored articles dropped as expired or legacy
    pub expired: usize,
    /// Articles dropped to respect the cap
    pub evicted: usize,
    /// Size of the collection after the merge
    pub total: usize,
    /// Whether the merge reached storage
    pub persisted: bool,
}

#[derive(Debug, Default)]
struct StoreState {
    articles: Vec<Article>,
    last_search: Option<LastSearchRecord>,
    /// Memory holds changes storage has not accepted
    dirty: bool,
}

#[derive(Debug, Default)]
struct Pruned {
    stale: usize,
    evicted: usize,
}

impl Pruned {
    fn any(&self) -> bool {
        self.stale + self.evicted > 0
    }
}

/// Capped, expiring article collection plus the last-search record
#[derive(Debug)]
pub struct ArticleStore {
    backend: Arc<dyn StorageBackend>,
    settings: StoreSettings,
    state: Mutex<StoreState>,
}

impl ArticleStore {
    pub fn new(backend: Arc<dyn StorageBackend>, settings: StoreSettings) -> Self {
        Self {
            backend,
            settings,
            state: Mutex::new(StoreState::default()),
        }
    }

    /// Store backed by JSON files in `dir`
    pub fn open(dir: impl Into<PathBuf>, settings: StoreSettings) -> Self {
        Self::new(Arc::new(JsonFileBackend::new(dir)), settings)
    }

    /// Store that never touches disk
    pub fn in_memory(settings: StoreSettings) -> Self {
        Self::new(Arc::new(MemoryBackend::new()), settings)
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    /// Where the store persists to
    pub fn location(&self) -> String {
        self.backend.describe()
    }

    /// True after a failed write, until a write succeeds
    pub fn is_degraded(&self) -> bool {
        self.lock().dirty
    }

    /// Currently valid articles, newest first
    pub fn load_all(&self) -> Vec<Article> {
        self.load_all_at(Utc::now())
    }

    /// [`load_all`](Self::load_all) evaluated at `now`
    ///
    /// Expired, legacy, duplicate and over-cap records are dropped, and the
    /// cleaned collection is written back when anything was dropped.
    pub fn load_all_at(&self, now: DateTime<Utc>) -> Vec<Article> {
        let mut state = self.lock();
        let pruned = self.sync_articles(&mut state, now);
        if pruned.any() {
            tracing::info!(
                stale = pruned.stale,
                evicted = pruned.evicted,
                "Purged stale articles from store"
            );
            self.persist(&mut state);
        }
        state.articles.clone()
    }

    /// Merge a run's articles into the store and record the run
    pub fn merge_and_save(&self, articles: Vec<Article>, run: &SearchRun) -> MergeSummary {
        self.merge_and_save_at(articles, run, Utc::now())
    }

    /// [`merge_and_save`](Self::merge_and_save) evaluated at `now`
    ///
    /// New articles whose URL is already stored are dropped, the rest are
    /// stamped and prepended, and the result is truncated to the cap. The
    /// last-search record takes its counts from `run`, not from the merge.
    pub fn merge_and_save_at(
        &self,
        articles: Vec<Article>,
        run: &SearchRun,
        now: DateTime<Utc>,
    ) -> MergeSummary {
        let mut state = self.lock();
        let pruned = self.sync_articles(&mut state, now);

        let mut seen: HashSet<String> = state.articles.iter().map(|a| url_key(&a.url)).collect();
        let mut merged = Vec::with_capacity(articles.len() + state.articles.len());
        let mut duplicates = 0;
        for article in articles {
            if seen.insert(url_key(&article.url)) {
                merged.push(article.stamped(now, self.settings.retention));
            } else {
                duplicates += 1;
            }
        }
        let fresh = merged.len();
        merged.append(&mut state.articles);

        let cap = self.settings.max_articles;
        let evicted = merged.len().saturating_sub(cap);
        merged.truncate(cap);

        state.articles = merged;
        state.last_search = Some(LastSearchRecord::for_run(
            run,
            now,
            self.settings.search_interval,
        ));
        let persisted = self.persist(&mut state);

        let summary = MergeSummary {
            added: fresh.min(cap),
            duplicates,
            expired: pruned.stale,
            evicted: evicted + pruned.evicted,
            total: state.articles.len(),
            persisted,
        };
        tracing::info!(
            added = summary.added,
            duplicates = summary.duplicates,
            expired = summary.expired,
            evicted = summary.evicted,
            total = summary.total,
            "Merged search results into store"
        );
        summary
    }

    /// Most recent completed run, if any
    pub fn last_search(&self) -> Option<LastSearchRecord> {
        let mut state = self.lock();
        self.sync_last_search(&mut state);
        state.last_search.clone()
    }

    /// Whether a scheduled run is due
    pub fn needs_new_search(&self) -> bool {
        self.needs_new_search_at(Utc::now())
    }

    /// No run has ever completed, or the next scheduled run time has passed
    pub fn needs_new_search_at(&self, now: DateTime<Utc>) -> bool {
        self.last_search().map_or(true, |record| record.is_due(now))
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reload articles from storage (unless memory is authoritative) and prune
    fn sync_articles(&self, state: &mut StoreState, now: DateTime<Utc>) -> Pruned {
        let mut pruned = Pruned::default();

        if !state.dirty {
            match self.backend.read_articles() {
                Ok(records) => {
                    let (articles, legacy) = decode_articles(records.unwrap_or_default());
                    state.articles = articles;
                    pruned.stale += legacy;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read stored articles, serving in-memory copy");
                }
            }
        }

        let before = state.articles.len();
        state.articles.retain(|a| !a.is_expired(now));
        let mut seen = HashSet::new();
        state.articles.retain(|a| seen.insert(url_key(&a.url)));
        pruned.stale += before - state.articles.len();

        let cap = self.settings.max_articles;
        if state.articles.len() > cap {
            pruned.evicted = state.articles.len() - cap;
            state.articles.truncate(cap);
        }
        pruned
    }

    fn sync_last_search(&self, state: &mut StoreState) {
        if state.dirty {
            return;
        }
        match self.backend.read_last_search() {
            Ok(None) => state.last_search = None,
            Ok(Some(value)) => match serde_json::from_value::<LastSearchRecord>(value) {
                Ok(record) => state.last_search = Some(record),
                Err(e) => {
                    tracing::warn!(error = %e, "Ignoring unreadable last-search record");
                    state.last_search = None;
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read last-search record, serving in-memory copy");
            }
        }
    }

    /// Write both records; on failure keep going in memory-only mode
    fn persist(&self, state: &mut StoreState) -> bool {
        match self.write_records(state) {
            Ok(()) => {
                if state.dirty {
                    tracing::info!(location = %self.backend.describe(), "Store resynchronized with storage");
                }
                state.dirty = false;
                true
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    location = %self.backend.describe(),
                    "Failed to persist store, continuing in memory-only mode"
                );
                state.dirty = true;
                false
            }
        }
    }

    fn write_records(&self, state: &StoreState) -> Result<(), StoreError> {
        let records = state
            .articles
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<Value>, _>>()?;
        self.backend.write_articles(&records)?;

        if let Some(record) = &state.last_search {
            self.backend.write_last_search(&serde_json::to_value(record)?)?;
        }
        Ok(())
    }
}

/// Decode raw records, counting the ones that are not complete articles
fn decode_articles(records: Vec<Value>) -> (Vec<Article>, usize) {
    let total = records.len();
    let articles: Vec<Article> = records
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<Article>(value) {
            Ok(article) if article.expires_at > article.date_found => Some(article),
            Ok(article) => {
                tracing::debug!(url = %article.url, "Dropping record with invalid expiry");
                None
            }
            Err(e) => {
                tracing::debug!(error = %e, "Dropping legacy record");
                None
            }
        })
        .collect();
    let legacy = total - articles.len();
    (articles, legacy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArticleBuilder, SourceType};
    use serde_json::json;

    fn article(n: usize) -> Article {
        ArticleBuilder::new(
            format!("Patient blood management study {}", n),
            format!("https://pubmed.ncbi.nlm.nih.gov/{}/", n),
            SourceType::PubMed,
        )
        .build()
        .unwrap()
    }

    fn run_with(count: usize) -> SearchRun {
        let mut run = SearchRun::new(vec!["pbm".to_string()], Utc::now());
        run.articles_found = count;
        run.sources.insert("pubmed".to_string());
        run
    }

    fn memory_store(cap: usize) -> (Arc<MemoryBackend>, ArticleStore) {
        let backend = Arc::new(MemoryBackend::new());
        let settings = StoreSettings {
            max_articles: cap,
            ..StoreSettings::default()
        };
        (backend.clone(), ArticleStore::new(backend, settings))
    }

    #[test]
    fn test_empty_store() {
        let (_, store) = memory_store(15);
        assert!(store.load_all().is_empty());
        assert!(store.last_search().is_none());
        assert!(store.needs_new_search());
        assert!(!store.is_degraded());
    }

    #[test]
    fn test_merge_prepends_and_skips_duplicates() {
        let (_, store) = memory_store(15);
        let now = Utc::now();

        store.merge_and_save_at(vec![article(1), article(2)], &run_with(2), now);
        let summary =
            store.merge_and_save_at(vec![article(3), article(1), article(3)], &run_with(3), now);

        assert_eq!(summary.added, 1);
        assert_eq!(summary.duplicates, 2);
        assert_eq!(summary.total, 3);
        assert!(summary.persisted);

        let urls: Vec<String> = store.load_all_at(now).into_iter().map(|a| a.url).collect();
        assert_eq!(
            urls,
            vec![
                "https://pubmed.ncbi.nlm.nih.gov/3/",
                "https://pubmed.ncbi.nlm.nih.gov/1/",
                "https://pubmed.ncbi.nlm.nih.gov/2/",
            ]
        );
    }

    #[test]
    fn test_merge_records_run_counts() {
        let (_, store) = memory_store(2);
        let now = Utc::now();

        store.merge_and_save_at(vec![article(1), article(2), article(3)], &run_with(3), now);

        let record = store.last_search().unwrap();
        assert_eq!(record.articles_found, 3);
        assert_eq!(record.sources_searched, vec!["pubmed".to_string()]);
        assert_eq!(record.last_search_timestamp, now);
        assert_eq!(record.next_scheduled_search, now + Duration::days(7));
        assert_eq!(store.load_all_at(now).len(), 2);
    }

    #[test]
    fn test_merge_stamps_articles() {
        let (_, store) = memory_store(15);
        let now = Utc::now() + Duration::days(3);

        store.merge_and_save_at(vec![article(1)], &run_with(1), now);
        let stored = &store.load_all_at(now)[0];
        assert_eq!(stored.date_found, now);
        assert_eq!(stored.expires_at, now + Duration::days(30));
    }

    #[test]
    fn test_expired_articles_are_purged_on_read() {
        let (backend, store) = memory_store(15);
        let now = Utc::now();

        store.merge_and_save_at(vec![article(1)], &run_with(1), now - Duration::days(31));
        store.merge_and_save_at(vec![article(2)], &run_with(1), now);

        let articles = store.load_all_at(now);
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].url, "https://pubmed.ncbi.nlm.nih.gov/2/");
        assert_eq!(backend.records().map(|r| r.len()), Some(1));
    }

    #[test]
    fn test_legacy_records_are_purged_and_rewritten() {
        let valid = serde_json::to_value(article(1)).unwrap();
        let mut legacy = valid.clone();
        legacy["url"] = json!("https://pubmed.ncbi.nlm.nih.gov/99/");
        legacy.as_object_mut().unwrap().remove("expiresAt");

        let backend = Arc::new(MemoryBackend::with_records(vec![
            legacy,
            json!({"title": "not an article"}),
            valid,
        ]));
        let store = ArticleStore::new(backend.clone(), StoreSettings::default());

        let articles = store.load_all();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].url, "https://pubmed.ncbi.nlm.nih.gov/1/");
        assert_eq!(backend.records().map(|r| r.len()), Some(1));
    }

    #[test]
    fn test_needs_new_search_interval() {
        let (_, store) = memory_store(15);
        let now = Utc::now();

        store.merge_and_save_at(Vec::new(), &run_with(0), now);
        assert!(!store.needs_new_search_at(now));
        assert!(!store.needs_new_search_at(now + Duration::days(6)));
        assert!(store.needs_new_search_at(now + Duration::days(7)));
    }

    #[test]
    fn test_unreadable_last_search_counts_as_never() {
        let backend = Arc::new(MemoryBackend::new().with_last_search(json!({"when": "yesterday"})));
        let store = ArticleStore::new(backend, StoreSettings::default());
        assert!(store.last_search().is_none());
        assert!(store.needs_new_search());
    }

    #[test]
    fn test_degraded_mode_keeps_memory_authoritative() {
        let (backend, store) = memory_store(15);
        let now = Utc::now();

        backend.set_unavailable(true);
        let summary = store.merge_and_save_at(vec![article(1)], &run_with(1), now);
        assert!(!summary.persisted);
        assert!(store.is_degraded());
        assert_eq!(store.load_all_at(now).len(), 1);
        assert!(!store.needs_new_search_at(now));
        assert!(backend.records().is_none());

        backend.set_unavailable(false);
        let summary = store.merge_and_save_at(vec![article(2)], &run_with(1), now);
        assert!(summary.persisted);
        assert!(!store.is_degraded());
        assert_eq!(backend.records().map(|r| r.len()), Some(2));
    }

    #[test]
    fn test_concurrent_merges_respect_cap() {
        let (_, store) = memory_store(5);

        std::thread::scope(|scope| {
            for t in 0..4 {
                let store = &store;
                scope.spawn(move || {
                    for i in 0..5 {
                        store.merge_and_save(vec![article(t * 100 + i)], &run_with(1));
                    }
                });
            }
        });

        let articles = store.load_all();
        assert_eq!(articles.len(), 5);
        let unique: HashSet<_> = articles.iter().map(|a| a.url.clone()).collect();
        assert_eq!(unique.len(), 5);
    }

    #[test]
    fn test_settings_from_config() {
        let config = StoreConfig {
            max_articles: 40,
            retention_days: 10,
            search_interval_days: 3,
            ..StoreConfig::default()
        };
        let settings = StoreSettings::from(&config);
        assert_eq!(settings.max_articles, 40);
        assert_eq!(settings.retention, Duration::days(10));
        assert_eq!(settings.search_interval, Duration::days(3));
    }
}
