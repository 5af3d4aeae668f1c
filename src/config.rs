//! Configuration types for a diagnostic run.
//!
//! Every knob lives in [`DdrConfig`], built via [`DdrConfigBuilder`] and
//! passed explicitly to every stage. The only process-wide state consulted
//! afterwards is the environment, for provider auto-detection when no
//! provider or capability is set.

use crate::error::DdrError;
use crate::pipeline::llm::ReasoningCapability;
use crate::progress::ProgressCallback;
use crate::schema::{area_key, clean_label};
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Configuration for one general + thermal → DDR run.
///
/// Built via [`DdrConfig::builder()`] or using [`DdrConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_ddr::DdrConfig;
///
/// let config = DdrConfig::builder()
///     .model("gpt-4.1-mini")
///     .alias("Bedroom 1", "Master Bedroom")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct DdrConfig {
    /// LLM model identifier, e.g. "gpt-4.1-mini". Must accept images.
    /// If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "gemini").
    /// If None along with `provider`, the provider is resolved from the environment.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Pre-constructed reasoning capability. Takes precedence over everything
    /// else; used by tests and by hosts that route calls themselves.
    pub capability: Option<Arc<dyn ReasoningCapability>>,

    /// Sampling temperature for both extraction calls. Default: 0.1.
    pub extraction_temperature: f32,

    /// Sampling temperature for the reconciliation call. Default: 0.2.
    pub synthesis_temperature: f32,

    /// Maximum tokens any single call may generate. Default: 8192.
    ///
    /// A long inspection report can list dozens of observations; a truncated
    /// reply is unparseable JSON and fails the run.
    pub max_tokens: usize,

    /// Thermal rasterisation DPI. Range: 72–400. Default: 150.
    pub dpi: u32,

    /// Maximum rendered image dimension in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// Thermal pages to rasterise. Default: all.
    pub thermal_pages: PageSelection,

    /// PDF user password, tried on both documents.
    pub password: Option<String>,

    /// Explicit area aliases applied before matching.
    pub aliases: AreaAliases,

    /// Run both extractions at the same time. Default: true.
    pub concurrent_extraction: bool,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Per-call reasoning timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Stage progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for DdrConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            capability: None,
            extraction_temperature: 0.1,
            synthesis_temperature: 0.2,
            max_tokens: 8192,
            dpi: 150,
            max_rendered_pixels: 2000,
            thermal_pages: PageSelection::default(),
            password: None,
            aliases: AreaAliases::default(),
            concurrent_extraction: true,
            download_timeout_secs: 120,
            api_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for DdrConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DdrConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field(
                "capability",
                &self.capability.as_ref().map(|_| "<dyn ReasoningCapability>"),
            )
            .field("extraction_temperature", &self.extraction_temperature)
            .field("synthesis_temperature", &self.synthesis_temperature)
            .field("max_tokens", &self.max_tokens)
            .field("dpi", &self.dpi)
            .field("thermal_pages", &self.thermal_pages)
            .field("aliases", &self.aliases.len())
            .field("concurrent_extraction", &self.concurrent_extraction)
            .finish()
    }
}

impl DdrConfig {
    /// Create a new builder for `DdrConfig`.
    pub fn builder() -> DdrConfigBuilder {
        DdrConfigBuilder {
            config: Self::default(),
            alias_error: None,
        }
    }
}

/// Builder for [`DdrConfig`].
pub struct DdrConfigBuilder {
    config: DdrConfig,
    /// First invalid alias pair, reported by `build()`.
    alias_error: Option<String>,
}

impl fmt::Debug for DdrConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DdrConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl DdrConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn capability(mut self, capability: Arc<dyn ReasoningCapability>) -> Self {
        self.config.capability = Some(capability);
        self
    }

    pub fn extraction_temperature(mut self, t: f32) -> Self {
        self.config.extraction_temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn synthesis_temperature(mut self, t: f32) -> Self {
        self.config.synthesis_temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn thermal_pages(mut self, selection: PageSelection) -> Self {
        self.config.thermal_pages = selection;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    /// Map `alias` onto `canonical` before areas are matched.
    pub fn alias(mut self, alias: impl AsRef<str>, canonical: impl AsRef<str>) -> Self {
        if let Err(e) = self.config.aliases.insert(alias.as_ref(), canonical.as_ref()) {
            self.alias_error.get_or_insert(e.to_string());
        }
        self
    }

    /// Replace the whole alias table.
    pub fn aliases(mut self, aliases: AreaAliases) -> Self {
        self.config.aliases = aliases;
        self
    }

    pub fn concurrent_extraction(mut self, v: bool) -> Self {
        self.config.concurrent_extraction = v;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<DdrConfig, DdrError> {
        if let Some(e) = self.alias_error {
            return Err(DdrError::InvalidConfig(e));
        }
        let c = &self.config;
        if c.max_tokens == 0 {
            return Err(DdrError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.api_timeout_secs == 0 {
            return Err(DdrError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        if let PageSelection::Range(start, end) = c.thermal_pages {
            if start == 0 || start > end {
                return Err(DdrError::InvalidConfig(format!(
                    "invalid thermal page range {start}-{end}"
                )));
            }
        }
        Ok(self.config)
    }
}

// ── Area aliases ─────────────────────────────────────────────────────────

/// Explicit alias table: different labels for the same physical area.
///
/// Lookup keys are normalised the same way area labels are
/// ([`crate::schema::area_key`]), so `"bedroom  1"` matches an alias
/// registered as `"Bedroom 1"`. Aliases resolve in one step; a canonical
/// name is never looked up again.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaAliases {
    /// area key of the alias → cleaned canonical label.
    map: BTreeMap<String, String>,
}

impl AreaAliases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `alias` as another name for `canonical`.
    pub fn insert(&mut self, alias: &str, canonical: &str) -> Result<(), DdrError> {
        let key = area_key(alias);
        let canonical = clean_label(canonical);
        if key.is_empty() || canonical.is_empty() {
            return Err(DdrError::InvalidConfig(format!(
                "area alias '{alias}' → '{canonical}' has an empty side"
            )));
        }
        if let Some(existing) = self.map.get(&key) {
            if area_key(existing) != area_key(&canonical) {
                return Err(DdrError::InvalidConfig(format!(
                    "area alias '{alias}' maps to both '{existing}' and '{canonical}'"
                )));
            }
        }
        self.map.insert(key, canonical);
        Ok(())
    }

    /// Parse one `ALIAS=CANONICAL` pair, as given on the command line.
    pub fn parse_pair(s: &str) -> Result<(String, String), DdrError> {
        match s.split_once('=') {
            Some((alias, canonical)) if !alias.trim().is_empty() && !canonical.trim().is_empty() => {
                Ok((alias.trim().to_string(), canonical.trim().to_string()))
            }
            _ => Err(DdrError::InvalidConfig(format!(
                "area alias must look like 'Bedroom 1=Master Bedroom', got '{s}'"
            ))),
        }
    }

    /// Load a JSON object of `"alias": "canonical"` entries.
    pub fn from_json(json: &str) -> Result<Self, DdrError> {
        let raw: BTreeMap<String, String> = serde_json::from_str(json)
            .map_err(|e| DdrError::InvalidConfig(format!("alias file: {e}")))?;
        let mut aliases = Self::new();
        for (alias, canonical) in &raw {
            aliases.insert(alias, canonical)?;
        }
        Ok(aliases)
    }

    /// The canonical label `label` is an alias of, if any.
    pub fn canonical(&self, label: &str) -> Option<&str> {
        self.map.get(&area_key(label)).map(String::as_str)
    }

    /// Matching key for `label` after alias resolution.
    pub fn key(&self, label: &str) -> String {
        match self.canonical(label) {
            Some(canonical) => area_key(canonical),
            None => area_key(label),
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

// ── Page selection ───────────────────────────────────────────────────────

/// Specifies which pages of the thermal report to rasterise.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// All pages (default).
    #[default]
    All,
    /// A single page (1-indexed).
    Single(usize),
    /// A contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}
