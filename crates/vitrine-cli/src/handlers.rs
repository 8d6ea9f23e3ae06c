//! Handler functions for catalog commands.
//!
//! Each `run_*` function does the work and returns data; the matching
//! `handle_*` function prints it. Mutating commands flush the backend
//! before returning so the next invocation sees their writes.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use vitrine_core::{Error, Metadata, Result, VectorRecord};
use vitrine_vector::{
    EmbeddingProvider, HitSource, IngestFailure, IngestReport, MockEmbeddingProvider,
    OpenedBackend, ProductInput, RecordBuilder, SearchOrchestrator, SearchRequest, SearchResults,
    SearchSettings, create_storage_backend,
};

use crate::config::{ProviderKind, VitrineConfig};

// ============================================================================
// Service wiring
// ============================================================================

/// Build the configured embedding provider.
pub fn build_provider(config: &VitrineConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let text_dimension = config.vector.text_dimension;
    let image_dimension = config.vector.image_dimension;

    match config.provider.kind {
        ProviderKind::Mock => Ok(Arc::new(MockEmbeddingProvider::new(
            text_dimension,
            image_dimension,
        ))),
        ProviderKind::Http => build_http_provider(config),
    }
}

#[cfg(feature = "provider-http")]
fn build_http_provider(config: &VitrineConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    use vitrine_vector::{HttpEmbeddingProvider, HttpProviderConfig};

    let provider = &config.provider;
    let (Some(text_url), Some(image_url)) = (&provider.text_url, &provider.image_url) else {
        return Err(Error::config(
            "the http provider needs provider.text_url and provider.image_url",
        ));
    };
    let http = HttpEmbeddingProvider::new(HttpProviderConfig {
        text_url: text_url.clone(),
        image_url: image_url.clone(),
        api_key: provider.api_key.clone(),
        text_dimension: config.vector.text_dimension,
        image_dimension: config.vector.image_dimension,
        timeout_ms: provider.timeout_ms,
    })?;
    Ok(Arc::new(http))
}

#[cfg(not(feature = "provider-http"))]
fn build_http_provider(_config: &VitrineConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    Err(Error::config(
        "provider.kind = \"http\" requires building with the provider-http feature",
    ))
}

/// An opened backend plus the provider that feeds it.
pub struct Services {
    opened: OpenedBackend,
    provider: Arc<dyn EmbeddingProvider>,
    config: VitrineConfig,
}

impl Services {
    /// Open the configured backend and provider.
    pub async fn open(config: &VitrineConfig) -> Result<Self> {
        let provider = build_provider(config)?;
        let opened = create_storage_backend(&config.vector).await?;
        debug!(
            "Using {} provider with {} backend",
            provider.name(),
            opened.backend.name()
        );
        Ok(Self {
            opened,
            provider,
            config: config.clone(),
        })
    }

    /// A search orchestrator over these services.
    pub fn orchestrator(&self) -> SearchOrchestrator {
        SearchOrchestrator::new(
            Arc::clone(&self.provider),
            Arc::clone(&self.opened.backend),
            SearchSettings::from_config(&self.config.vector),
        )
    }

    /// A record builder over these services.
    pub fn record_builder(&self) -> RecordBuilder {
        RecordBuilder::new(
            Arc::clone(&self.provider),
            Arc::clone(&self.opened.backend),
            self.config.vector.timeout(),
        )
    }

    /// Persist whatever the backend keeps in memory.
    pub async fn flush(&self) -> Result<()> {
        self.opened.flush().await
    }
}

// ============================================================================
// Ingest
// ============================================================================

/// One line of an ingest file.
#[derive(Debug, Deserialize)]
struct IngestLine {
    id: String,
    #[serde(default)]
    metadata: Metadata,
    #[serde(default)]
    text: Option<String>,
    /// Relative paths resolve against the ingest file's directory.
    #[serde(default)]
    image_path: Option<PathBuf>,
}

/// Parse an ingest file into products, collecting lines that cannot be used.
async fn read_ingest_file(path: &Path) -> Result<(Vec<ProductInput>, Vec<IngestFailure>)> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::io_with_path(e, path))?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));

    let mut inputs = Vec::new();
    let mut failures = Vec::new();
    for (index, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let parsed: IngestLine = match serde_json::from_str(line) {
            Ok(parsed) => parsed,
            Err(e) => {
                failures.push(IngestFailure {
                    id: format!("line {}", index + 1),
                    error: format!("invalid product JSON: {e}"),
                });
                continue;
            }
        };

        let mut input = ProductInput::new(parsed.id).with_metadata(parsed.metadata);
        input.text = parsed.text;
        if let Some(image_path) = parsed.image_path {
            let image_path = base.join(image_path);
            match tokio::fs::read(&image_path).await {
                Ok(bytes) => input.image = Some(bytes),
                Err(e) => {
                    failures.push(IngestFailure {
                        id: input.id,
                        error: Error::io_with_path(e, &image_path).to_string(),
                    });
                    continue;
                }
            }
        }
        inputs.push(input);
    }
    Ok((inputs, failures))
}

/// Ingest a JSON Lines product file.
pub async fn run_ingest(
    config: &VitrineConfig,
    file: &Path,
    concurrency: Option<usize>,
) -> Result<IngestReport> {
    let (inputs, mut unreadable) = read_ingest_file(file).await?;
    info!("Read {} products from {}", inputs.len(), file.display());

    let services = Services::open(config).await?;
    let concurrency = concurrency.unwrap_or(config.ingest.concurrency);
    let mut report = services.record_builder().ingest(inputs, concurrency).await;
    services.flush().await?;

    report.failed.append(&mut unreadable);
    report.failed.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(report)
}

/// Ingest and print a summary.
pub async fn handle_ingest(
    config: &VitrineConfig,
    file: &Path,
    concurrency: Option<usize>,
) -> Result<()> {
    let report = run_ingest(config, file, concurrency).await?;
    println!(
        "Ingested {} products ({} failed) in {}ms",
        report.upserted,
        report.failed.len(),
        report.duration_ms
    );
    for failure in &report.failed {
        eprintln!("  {}: {}", failure.id, failure.error);
    }
    Ok(())
}

// ============================================================================
// Search
// ============================================================================

/// Parameters of a CLI search.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    /// Text query.
    pub text: Option<String>,
    /// Image file to query with.
    pub image: Option<PathBuf>,
    /// Maximum results.
    pub limit: usize,
    /// Continue with one modality if the other fails.
    pub allow_degraded: bool,
}

/// Run a search.
pub async fn run_search(config: &VitrineConfig, options: SearchOptions) -> Result<SearchResults> {
    let mut request = SearchRequest::new().with_limit(options.limit);
    if let Some(text) = options.text {
        request = request.with_text(text);
    }
    if let Some(path) = &options.image {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| Error::io_with_path(e, path))?;
        request = request.with_image(bytes);
    }
    if options.allow_degraded {
        request = request.allow_degraded();
    }

    let services = Services::open(config).await?;
    services.orchestrator().search(request).await
}

fn source_label(source: HitSource) -> &'static str {
    match source {
        HitSource::Text => "text",
        HitSource::Image => "image",
        HitSource::Both => "text+image",
    }
}

/// Render results as human-readable lines.
fn format_results(results: &SearchResults) -> Vec<String> {
    if results.items.is_empty() {
        return vec!["No results".to_string()];
    }
    results
        .items
        .iter()
        .enumerate()
        .map(|(i, hit)| {
            let name = hit
                .metadata
                .get("name")
                .map(|v| format!("  {v}"))
                .unwrap_or_default();
            format!(
                "{:>3}. {}  {:.5}  [{}]{name}",
                i + 1,
                hit.id,
                hit.score,
                source_label(hit.source)
            )
        })
        .collect()
}

/// Search and print results.
pub async fn handle_search(
    config: &VitrineConfig,
    options: SearchOptions,
    json: bool,
) -> Result<()> {
    let results = run_search(config, options).await?;
    for degradation in &results.degraded {
        warn!("Degraded search: {degradation}");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        for line in format_results(&results) {
            println!("{line}");
        }
        for degradation in &results.degraded {
            eprintln!("note: {degradation}");
        }
    }
    Ok(())
}

// ============================================================================
// Get / delete
// ============================================================================

/// Fetch a record, failing with `NotFound` for unknown ids.
pub async fn run_get(config: &VitrineConfig, id: &str) -> Result<VectorRecord> {
    let services = Services::open(config).await?;
    services
        .orchestrator()
        .get(id)
        .await?
        .ok_or_else(|| Error::not_found(format!("no record with id '{id}'")))
}

/// Print a record as JSON.
pub async fn handle_get(config: &VitrineConfig, id: &str) -> Result<()> {
    let record = run_get(config, id).await?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

/// Delete a record. Unknown ids succeed.
pub async fn run_delete(config: &VitrineConfig, id: &str) -> Result<()> {
    let services = Services::open(config).await?;
    services.orchestrator().delete(id).await?;
    services.flush().await
}

/// Delete and confirm.
pub async fn handle_delete(config: &VitrineConfig, id: &str) -> Result<()> {
    run_delete(config, id).await?;
    println!("Deleted {id}");
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use vitrine_vector::BackendKind;

    fn test_config(dir: &TempDir, backend_kind: BackendKind) -> VitrineConfig {
        let mut config = VitrineConfig::default();
        config.vector.backend_kind = backend_kind;
        config.vector.text_dimension = 8;
        config.vector.image_dimension = 6;
        config.vector.db_path = Some(dir.path().join("db"));
        config
    }

    /// Three usable products, one missing image, one malformed line.
    fn write_catalog(dir: &TempDir) -> PathBuf {
        std::fs::write(dir.path().join("desk.png"), [0x89u8, 0x50, 0x4e, 0x47, 7, 7]).unwrap();
        let path = dir.path().join("products.jsonl");
        std::fs::write(
            &path,
            [
                r#"{"id": "chair", "metadata": {"name": "Oak Chair", "price": 120}}"#,
                r#"{"id": "desk", "text": "walnut writing desk", "image_path": "desk.png"}"#,
                "",
                r#"{"id": "lamp", "metadata": {"name": "Brass Lamp"}, "image_path": "lamp.png"}"#,
                "not json",
                r#"{"id": "rug", "metadata": {"name": "Wool Rug", "category": "Textiles"}}"#,
            ]
            .join("\n"),
        )
        .unwrap();
        path
    }

    #[test]
    fn test_build_provider_mock() {
        let config = VitrineConfig::default();
        let provider = build_provider(&config).unwrap();
        assert_eq!(provider.name(), "mock");
        assert_eq!(provider.text_dimension(), 1536);
    }

    #[cfg(not(feature = "provider-http"))]
    #[test]
    fn test_build_provider_http_requires_feature() {
        let mut config = VitrineConfig::default();
        config.provider.kind = ProviderKind::Http;
        assert!(matches!(build_provider(&config), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_read_ingest_file() {
        let dir = TempDir::new().unwrap();
        let path = write_catalog(&dir);
        let (inputs, failures) = read_ingest_file(&path).await.unwrap();

        let ids: Vec<_> = inputs.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["chair", "desk", "rug"]);
        assert_eq!(inputs[1].image.as_deref().map(<[u8]>::len), Some(6));

        let failed: Vec<_> = failures.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(failed, vec!["lamp", "line 5"]);
    }

    #[tokio::test]
    async fn test_ingest_search_get_delete_ann_index() {
        exercise_catalog(BackendKind::AnnIndex).await;
    }

    #[tokio::test]
    async fn test_ingest_search_get_delete_document_store() {
        exercise_catalog(BackendKind::DocumentStore).await;
    }

    async fn exercise_catalog(backend_kind: BackendKind) {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir, backend_kind);
        let file = write_catalog(&dir);

        let report = run_ingest(&config, &file, Some(2)).await.unwrap();
        assert_eq!(report.upserted, 3);
        assert_eq!(report.failed.len(), 2);

        // The mock provider maps identical text to identical vectors.
        let results = run_search(
            &config,
            SearchOptions {
                text: Some("Name: Oak Chair\nPrice: 120".to_string()),
                limit: 2,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(results.items[0].id, "chair");
        assert_eq!(results.total, 2);

        let results = run_search(
            &config,
            SearchOptions {
                image: Some(dir.path().join("desk.png")),
                limit: 5,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(results.ids(), vec!["desk"]);

        let desk = run_get(&config, "desk").await.unwrap();
        assert_eq!(desk.text_embedding.as_ref().map(Vec::len), Some(8));
        assert_eq!(desk.image_embedding.as_ref().map(Vec::len), Some(6));

        run_delete(&config, "desk").await.unwrap();
        run_delete(&config, "desk").await.unwrap();
        assert!(matches!(
            run_get(&config, "desk").await,
            Err(Error::NotFound(_))
        ));
        assert!(run_get(&config, "rug").await.is_ok());
    }

    #[tokio::test]
    async fn test_search_without_query_is_invalid() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir, BackendKind::AnnIndex);
        let err = run_search(
            &config,
            SearchOptions {
                limit: 5,
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_search_missing_image_file() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir, BackendKind::AnnIndex);
        let err = run_search(
            &config,
            SearchOptions {
                image: Some(dir.path().join("absent.png")),
                limit: 5,
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_format_results() {
        let empty = SearchResults {
            items: Vec::new(),
            total: 0,
            backend: "ann_index".to_string(),
            degraded: Vec::new(),
        };
        assert_eq!(format_results(&empty), vec!["No results"]);

        let mut metadata = Metadata::new();
        metadata.insert("name".into(), "Oak Chair".into());
        let results = SearchResults {
            items: vec![vitrine_vector::SearchHit {
                id: "chair".to_string(),
                score: 1.0 / 61.0,
                source: HitSource::Both,
                text_rank: Some(1),
                image_rank: Some(1),
                metadata,
            }],
            total: 1,
            backend: "ann_index".to_string(),
            degraded: Vec::new(),
        };
        assert_eq!(
            format_results(&results),
            vec!["  1. chair  0.01639  [text+image]  Oak Chair"]
        );
    }
}
