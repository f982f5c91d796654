//! Ordered registry of literature sources.

use std::sync::Arc;
use std::time::Duration;

use super::{
    BaseSource, DoajSource, EuropePmcSource, MedRxivSource, OpenAlexSource, PubMedSource,
    ScieloSource, SemanticScholarSource, Source, SourceError,
};
use crate::config::Config;
use crate::utils::HttpClient;

/// Source ids in default priority order (highest trust first)
pub const DEFAULT_SOURCE_ORDER: [&str; 8] = [
    "pubmed",
    "europe_pmc",
    "semantic",
    "doaj",
    "medrxiv",
    "scielo",
    "base",
    "openalex",
];

bitflags::bitflags! {
    /// Capabilities and signals that a source can provide
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SourceCapabilities: u32 {
        const SEARCH = 1 << 0;
        const YEAR_FILTER = 1 << 1;
        const CITATION_COUNTS = 1 << 2;
        const LANGUAGE = 1 << 3;
        const FULL_TEXT = 1 << 4;
    }
}

impl SourceCapabilities {
    /// Short labels for display
    pub fn labels(&self) -> Vec<&'static str> {
        let mut labels = Vec::new();
        if self.contains(Self::SEARCH) {
            labels.push("search");
        }
        if self.contains(Self::YEAR_FILTER) {
            labels.push("year");
        }
        if self.contains(Self::CITATION_COUNTS) {
            labels.push("citations");
        }
        if self.contains(Self::LANGUAGE) {
            labels.push("language");
        }
        if self.contains(Self::FULL_TEXT) {
            labels.push("full-text");
        }
        labels
    }
}

/// Registry of enabled sources
///
/// Iteration order is registration order, which is the priority order used
/// to break duplicate collisions.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: Vec<Arc<dyn Source>>,
}

impl SourceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry for the sources enabled in `config`, in its order
    ///
    /// Unknown ids are skipped with a warning.
    pub fn from_config(config: &Config) -> Result<Self, SourceError> {
        let mut registry = Self::new();
        let timeout = Duration::from_secs(config.search.timeout_seconds);

        for id in &config.search.sources {
            let id = id.trim().to_lowercase();
            let client = Arc::new(
                HttpClient::with_timeout(timeout)?
                    .rate_limited(config.rate_limits.for_source(&id)),
            );

            let source: Arc<dyn Source> = match id.as_str() {
                "pubmed" => Arc::new(
                    PubMedSource::with_client(client).with_api_key(config.api_keys.ncbi.clone()),
                ),
                "europe_pmc" => Arc::new(EuropePmcSource::with_client(client)),
                "semantic" => Arc::new(
                    SemanticScholarSource::with_client(client)
                        .with_api_key(config.api_keys.semantic_scholar.clone()),
                ),
                "doaj" => Arc::new(DoajSource::with_client(client)),
                "medrxiv" => Arc::new(
                    MedRxivSource::with_client(client)
                        .with_window_days(config.search.preprint_window_days),
                ),
                "scielo" => Arc::new(ScieloSource::with_client(client)),
                "base" => Arc::new(BaseSource::with_client(client)),
                "openalex" => Arc::new(
                    OpenAlexSource::with_client(client)
                        .with_mailto(config.api_keys.openalex_email.clone()),
                ),
                other => {
                    tracing::warn!("Unknown source '{}' in configuration, skipping", other);
                    continue;
                }
            };
            registry.register(source);
        }

        tracing::debug!(
            sources = ?registry.ids().collect::<Vec<_>>(),
            "Source registry initialized"
        );
        Ok(registry)
    }

    /// Register a source at the end of the priority order
    ///
    /// A source with an id that is already registered replaces it in place.
    pub fn register(&mut self, source: Arc<dyn Source>) {
        match self.sources.iter().position(|s| s.id() == source.id()) {
            Some(idx) => self.sources[idx] = source,
            None => self.sources.push(source),
        }
    }

    /// Get a source by ID
    pub fn get(&self, id: &str) -> Option<&Arc<dyn Source>> {
        self.sources.iter().find(|s| s.id() == id)
    }

    /// All sources in priority order
    pub fn all(&self) -> impl Iterator<Item = &Arc<dyn Source>> {
        self.sources.iter()
    }

    /// All source IDs in priority order
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|s| s.id())
    }

    pub fn has(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::MockSource;

    #[test]
    fn test_registry_from_default_config() {
        let registry = SourceRegistry::from_config(&Config::default()).unwrap();

        assert_eq!(registry.len(), 8);
        let ids: Vec<_> = registry.ids().collect();
        assert_eq!(ids, DEFAULT_SOURCE_ORDER.to_vec());
    }

    #[test]
    fn test_registry_respects_configured_order() {
        let mut config = Config::default();
        config.search.sources = vec![
            "OpenAlex".to_string(),
            "nonexistent".to_string(),
            "pubmed".to_string(),
        ];
        let registry = SourceRegistry::from_config(&config).unwrap();

        let ids: Vec<_> = registry.ids().collect();
        assert_eq!(ids, vec!["openalex", "pubmed"]);
        assert!(!registry.has("nonexistent"));
    }

    #[test]
    fn test_register_replaces_in_place() {
        let mut registry = SourceRegistry::new();
        registry.register(Arc::new(MockSource::new("a")));
        registry.register(Arc::new(MockSource::new("b")));
        registry.register(Arc::new(MockSource::new("a")));

        let ids: Vec<_> = registry.ids().collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_capabilities() {
        let registry = SourceRegistry::from_config(&Config::default()).unwrap();

        let openalex = registry.get("openalex").unwrap();
        assert!(openalex.supports_year_filter());
        assert!(openalex
            .capabilities()
            .contains(SourceCapabilities::CITATION_COUNTS));

        let scielo = registry.get("scielo").unwrap();
        assert!(!scielo.supports_year_filter());
        assert!(registry.get("medrxiv").unwrap().supports_year_filter());
    }

    #[test]
    fn test_capability_labels() {
        let caps = SourceCapabilities::SEARCH | SourceCapabilities::FULL_TEXT;
        assert_eq!(caps.labels(), vec!["search", "full-text"]);
    }
}
