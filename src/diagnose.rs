//! Pipeline entry points: two report locations in, one DDR out.
//!
//! ```text
//! general PDF ──▶ text ──▶ extract_general ──┐
//!                                            ├──▶ synthesize ──▶ render_markdown
//! thermal PDF ──▶ pages ─▶ extract_thermal ──┘
//! ```
//!
//! The two extraction branches share nothing and run concurrently unless
//! `concurrent_extraction` is off; synthesis waits for both. Every failure is
//! fatal and stage-tagged: there is no partial report and, for the `_to_file`
//! variants, no output file.

use crate::config::DdrConfig;
use crate::error::{DdrError, SourceError, Stage};
use crate::extract::{extract_general, extract_thermal};
use crate::format::render_markdown;
use crate::output::{CallUsage, DdrOutput, RunStats};
use crate::pipeline::llm::{LlmCapability, ReasoningCapability};
use crate::pipeline::{encode, input, pdf};
use crate::schema::{GeneralReportData, ThermalReportData};
use crate::synthesize::synthesize;
use edgequake_llm::{ImageData, LLMProvider, ProviderFactory};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Default model when the caller names a provider but no model.
const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Source content that has already been read from the documents.
///
/// Lets hosts that do their own PDF handling (or tests) enter the pipeline
/// after the collaborator step.
#[derive(Debug, Clone)]
pub struct DocumentSources {
    /// Raw text of the general inspection report.
    pub general_text: String,
    /// Thermal report pages, in order, as encoded images.
    pub thermal_pages: Vec<ImageData>,
}

/// Produce a DDR from a general report and a thermal report.
///
/// # Arguments
/// * `general` — local path or HTTP/HTTPS URL of the text-based inspection report
/// * `thermal` — local path or HTTP/HTTPS URL of the thermal-imaging report
/// * `config`  — run configuration
///
/// # Errors
/// Any stage failure ends the run; see [`DdrError`].
pub async fn diagnose(
    general: impl AsRef<str>,
    thermal: impl AsRef<str>,
    config: &DdrConfig,
) -> Result<DdrOutput, DdrError> {
    let general = general.as_ref();
    let thermal = thermal.as_ref();
    info!("Starting diagnosis: general={} thermal={}", general, thermal);
    run(
        config,
        GeneralSource::Location(general),
        ThermalSource::Location(thermal),
    )
    .await
}

/// Produce a DDR from already-read source content.
pub async fn diagnose_sources(
    sources: DocumentSources,
    config: &DdrConfig,
) -> Result<DdrOutput, DdrError> {
    info!(
        "Starting diagnosis from sources: {} chars, {} thermal page(s)",
        sources.general_text.len(),
        sources.thermal_pages.len()
    );
    run(
        config,
        GeneralSource::Text(sources.general_text),
        ThermalSource::Pages(sources.thermal_pages),
    )
    .await
}

/// Run [`diagnose`] and write the Markdown to `output_path`.
///
/// The file is written only after the whole pipeline succeeded, atomically.
pub async fn diagnose_to_file(
    general: impl AsRef<str>,
    thermal: impl AsRef<str>,
    output_path: impl AsRef<Path>,
    config: &DdrConfig,
) -> Result<DdrOutput, DdrError> {
    let output = diagnose(general, thermal, config).await?;
    write_atomic(output_path.as_ref(), &output.markdown).await?;
    Ok(output)
}

/// Run [`diagnose_sources`] and write the Markdown to `output_path`.
pub async fn diagnose_sources_to_file(
    sources: DocumentSources,
    output_path: impl AsRef<Path>,
    config: &DdrConfig,
) -> Result<DdrOutput, DdrError> {
    let output = diagnose_sources(sources, config).await?;
    write_atomic(output_path.as_ref(), &output.markdown).await?;
    Ok(output)
}

/// Synchronous wrapper around [`diagnose`].
///
/// Creates a temporary tokio runtime internally.
pub fn diagnose_sync(
    general: impl AsRef<str>,
    thermal: impl AsRef<str>,
    config: &DdrConfig,
) -> Result<DdrOutput, DdrError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| DdrError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(diagnose(general, thermal, config))
}

/// Write `contents` to `path` via a sibling temp file and a rename.
pub async fn write_atomic(path: &Path, contents: &str) -> Result<(), DdrError> {
    let failed = |source| DdrError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(failed)?;
    }

    let ext = path
        .extension()
        .map(|e| format!("{}.tmp", e.to_string_lossy()))
        .unwrap_or_else(|| "tmp".to_string());
    let tmp_path = path.with_extension(ext);

    tokio::fs::write(&tmp_path, contents)
        .await
        .map_err(failed)?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(failed(e));
    }
    debug!("Wrote {} bytes to {}", contents.len(), path.display());
    Ok(())
}

// ── Internal helpers ─────────────────────────────────────────────────────

enum GeneralSource<'a> {
    Location(&'a str),
    Text(String),
}

enum ThermalSource<'a> {
    Location(&'a str),
    Pages(Vec<ImageData>),
}

async fn run(
    config: &DdrConfig,
    general: GeneralSource<'_>,
    thermal: ThermalSource<'_>,
) -> Result<DdrOutput, DdrError> {
    if let Some(ref cb) = config.progress_callback {
        cb.on_run_start();
    }
    let result = run_stages(config, general, thermal).await;
    if let Some(ref cb) = config.progress_callback {
        cb.on_run_complete(result.is_ok());
    }
    result
}

async fn run_stages(
    config: &DdrConfig,
    general: GeneralSource<'_>,
    thermal: ThermalSource<'_>,
) -> Result<DdrOutput, DdrError> {
    let total_start = Instant::now();
    let capability = resolve_capability(config).await?;
    let cap = capability.as_ref();

    // ── Extraction ───────────────────────────────────────────────────────
    let extraction_start = Instant::now();
    let general_branch = staged(
        Stage::GeneralExtraction,
        config,
        run_general(cap, general, config),
    );
    let thermal_branch = staged(
        Stage::ThermalExtraction,
        config,
        run_thermal(cap, thermal, config),
    );
    let (general, thermal) = if config.concurrent_extraction {
        futures::future::try_join(general_branch, thermal_branch).await?
    } else {
        let g = general_branch.await?;
        let t = thermal_branch.await?;
        (g, t)
    };
    let extraction_duration_ms = extraction_start.elapsed().as_millis() as u64;

    let (general_data, general_usage, general_text_chars) = general;
    let (thermal_data, thermal_usage, thermal_pages) = thermal;
    let mut calls = vec![general_usage, thermal_usage];

    // ── Synthesis ────────────────────────────────────────────────────────
    let synthesis_start = Instant::now();
    let (report, synthesis_usage) = staged(
        Stage::Synthesis,
        config,
        synthesize(cap, general_data, thermal_data, config),
    )
    .await?;
    let synthesis_duration_ms = synthesis_start.elapsed().as_millis() as u64;
    calls.extend(synthesis_usage);

    // ── Formatting ───────────────────────────────────────────────────────
    let markdown = staged(Stage::Formatting, config, async {
        Ok(render_markdown(&report))
    })
    .await?;

    let stats = RunStats {
        calls,
        general_text_chars,
        thermal_pages,
        extraction_duration_ms,
        synthesis_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };
    info!(
        "Diagnosis complete: {} finding(s), {} conflict(s), {} tokens in / {} out, {}ms",
        report.findings.len(),
        report.conflicts().count(),
        stats.total_input_tokens(),
        stats.total_output_tokens(),
        stats.total_duration_ms
    );

    Ok(DdrOutput {
        markdown,
        report,
        stats,
    })
}

/// Await `fut`, reporting start, completion and failure for `stage`.
async fn staged<T>(
    stage: Stage,
    config: &DdrConfig,
    fut: impl Future<Output = Result<T, DdrError>>,
) -> Result<T, DdrError> {
    let cb = config.progress_callback.as_ref();
    if let Some(cb) = cb {
        cb.on_stage_start(stage);
    }
    let start = Instant::now();
    let result = fut.await;
    let elapsed_ms = start.elapsed().as_millis() as u64;
    match (&result, cb) {
        (Ok(_), Some(cb)) => cb.on_stage_complete(stage, elapsed_ms),
        (Err(e), Some(cb)) => cb.on_stage_error(stage, &e.to_string()),
        _ => {}
    }
    match &result {
        Ok(_) => info!("[{}] done in {}ms", stage, elapsed_ms),
        Err(e) => info!("[{}] failed after {}ms: {}", stage, elapsed_ms, e),
    }
    result
}

async fn run_general(
    cap: &dyn ReasoningCapability,
    source: GeneralSource<'_>,
    config: &DdrConfig,
) -> Result<(GeneralReportData, CallUsage, usize), DdrError> {
    let stage = Stage::GeneralExtraction;
    let text = match source {
        GeneralSource::Text(text) => text,
        GeneralSource::Location(location) => {
            let resolved = input::resolve_input(location, config.download_timeout_secs)
                .await
                .map_err(|e| DdrError::extraction(stage, e))?;
            pdf::extract_text(resolved.path(), config.password.as_deref()).await?
        }
    };
    let chars = text.chars().count();
    let (data, usage) = extract_general(cap, &text, config).await?;
    Ok((data, usage, chars))
}

async fn run_thermal(
    cap: &dyn ReasoningCapability,
    source: ThermalSource<'_>,
    config: &DdrConfig,
) -> Result<(ThermalReportData, CallUsage, usize), DdrError> {
    let stage = Stage::ThermalExtraction;
    let pages = match source {
        ThermalSource::Pages(pages) => pages,
        ThermalSource::Location(location) => {
            let resolved = input::resolve_input(location, config.download_timeout_secs)
                .await
                .map_err(|e| DdrError::extraction(stage, e))?;
            let rendered = pdf::render_pages(resolved.path(), config).await?;
            encode::encode_pages(&rendered).map_err(|(page, e)| {
                DdrError::extraction(
                    stage,
                    SourceError::PageFailed {
                        page,
                        detail: format!("image encoding failed: {e}"),
                    },
                )
            })?
        }
    };
    let page_count = pages.len();
    let (data, usage) = extract_thermal(cap, pages, config).await?;
    Ok((data, usage, page_count))
}

/// Resolve the reasoning capability, from most-specific to least-specific.
///
/// 1. **Pre-built capability** (`config.capability`)
/// 2. **Pre-built provider** (`config.provider`)
/// 3. **Named provider + model** (`config.provider_name`)
/// 4. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`)
/// 5. **OpenAI key** (`OPENAI_API_KEY`)
/// 6. **Full auto-detection** (`ProviderFactory::from_env`)
async fn resolve_capability(config: &DdrConfig) -> Result<Arc<dyn ReasoningCapability>, DdrError> {
    if let Some(ref capability) = config.capability {
        return Ok(Arc::clone(capability));
    }
    let provider = resolve_provider(config)?;
    debug!(
        "Resolved LLM provider (name={:?}, model={:?})",
        config.provider_name, config.model
    );
    Ok(Arc::new(LlmCapability::new(
        provider,
        config.api_timeout_secs,
    )))
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, DdrError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        DdrError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

fn resolve_provider(config: &DdrConfig) -> Result<Arc<dyn LLMProvider>, DdrError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| DdrError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;
    Ok(llm_provider)
}
