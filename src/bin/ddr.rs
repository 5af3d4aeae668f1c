//! CLI binary for edgequake-ddr.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `DdrConfig` and prints the report.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_ddr::{
    diagnose, render_json, write_atomic, AreaAliases, DdrConfig, DdrError, PageSelection,
    PipelineProgressCallback, ProgressCallback, Stage,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one spinner per running stage.
///
/// The two extraction stages run at the same time, so each stage owns its
/// own bar inside a shared `MultiProgress`.
struct CliProgressCallback {
    multi: indicatif::MultiProgress,
    bars: Mutex<HashMap<Stage, ProgressBar>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            multi: indicatif::MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
        })
    }

    fn take_bar(&self, stage: Stage) -> Option<ProgressBar> {
        self.bars.lock().ok().and_then(|mut bars| bars.remove(&stage))
    }
}

fn stage_label(stage: Stage) -> &'static str {
    match stage {
        Stage::GeneralExtraction => "Reading inspection report",
        Stage::ThermalExtraction => "Reading thermal images",
        Stage::Synthesis => "Reconciling findings",
        Stage::Formatting => "Writing report",
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_run_start(&self) {
        let _ = self.multi.println(format!(
            "{} {}",
            cyan("◆"),
            bold("Building Detailed Diagnostic Report…")
        ));
    }

    fn on_stage_start(&self, stage: Stage) {
        let bar = self.multi.add(ProgressBar::new_spinner());
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg} {elapsed:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix(stage_label(stage));
        bar.set_message("…");
        bar.enable_steady_tick(Duration::from_millis(80));
        if let Ok(mut bars) = self.bars.lock() {
            bars.insert(stage, bar);
        }
    }

    fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
        if let Some(bar) = self.take_bar(stage) {
            bar.finish_and_clear();
        }
        let _ = self.multi.println(format!(
            "  {} {:<28} {}",
            green("✓"),
            stage_label(stage),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
    }

    fn on_stage_error(&self, stage: Stage, error: &str) {
        if let Some(bar) = self.take_bar(stage) {
            bar.finish_and_clear();
        }
        // Truncate very long error messages to keep output tidy.
        let msg: String = if error.chars().count() > 80 {
            let head: String = error.chars().take(79).collect();
            format!("{head}\u{2026}")
        } else {
            error.to_string()
        };
        let _ = self.multi.println(format!(
            "  {} {:<28} {}",
            red("✗"),
            stage_label(stage),
            red(&msg)
        ));
    }

    fn on_run_complete(&self, success: bool) {
        if let Ok(mut bars) = self.bars.lock() {
            for (_, bar) in bars.drain() {
                bar.finish_and_clear();
            }
        }
        if success {
            eprintln!("{} Report ready", green("✔"));
        } else {
            eprintln!("{} No report produced", red("✘"));
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Report to stdout
  ddr inspection.pdf thermal.pdf

  # Report to file
  ddr inspection.pdf thermal.pdf -o ddr.md

  # Only the image pages of the thermal report
  ddr --thermal-pages 3-15 inspection.pdf thermal.pdf -o ddr.md

  # Treat two labels as the same area
  ddr --alias "Loft=Attic" --alias "Bedroom 1=Master Bedroom" a.pdf b.pdf

  # Structured report as JSON
  ddr --json inspection.pdf thermal.pdf > ddr.json

  # Inputs from URLs, a specific model
  ddr --provider anthropic --model claude-sonnet-4-20250514 \
      https://example.com/inspection.pdf https://example.com/thermal.pdf

ALIAS FILE:
  A JSON object mapping each alias to its canonical area name:
    { "Loft": "Attic", "Bedroom 1": "Master Bedroom" }

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)

The model must accept images: the thermal report is read page by page as
pictures. Every fact in the report comes from one of the two documents;
anything neither states is shown as "Not Available".
"#;

/// Merge an inspection report and a thermal report into one DDR.
#[derive(Parser, Debug)]
#[command(
    name = "ddr",
    version,
    about = "Merge an inspection report and a thermal-imaging report into a Detailed Diagnostic Report",
    long_about = "Read a text-based property inspection report and a thermal-imaging report \
(local files or URLs), reconcile their findings per area, flag conflicts, and write one \
client-facing Detailed Diagnostic Report in Markdown. Supports OpenAI, Anthropic, Google \
Gemini, Azure OpenAI, and any OpenAI-compatible endpoint.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// General inspection report: local PDF path or HTTP/HTTPS URL.
    general: String,

    /// Thermal-imaging report: local PDF path or HTTP/HTTPS URL.
    thermal: String,

    /// Write the report to this file instead of stdout.
    #[arg(short, long, env = "DDR_OUTPUT")]
    output: Option<PathBuf>,

    /// LLM model ID (must accept images).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(
        long,
        env = "EDGEQUAKE_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set.\n\
          Supported: openai, anthropic, gemini, azure, ollama, or any OpenAI-compatible URL."
    )]
    provider: Option<String>,

    /// Thermal page rendering DPI (72–400).
    #[arg(long, env = "DDR_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Thermal pages to read: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "DDR_THERMAL_PAGES", default_value = "all")]
    thermal_pages: String,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "DDR_PASSWORD")]
    password: Option<String>,

    /// Max LLM output tokens per call.
    #[arg(long, env = "DDR_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// Temperature for the two extraction calls (0.0–2.0).
    #[arg(long, env = "DDR_EXTRACTION_TEMPERATURE", default_value_t = 0.1)]
    extraction_temperature: f32,

    /// Temperature for the reconciliation call (0.0–2.0).
    #[arg(long, env = "DDR_SYNTHESIS_TEMPERATURE", default_value_t = 0.2)]
    synthesis_temperature: f32,

    /// Area alias as "ALIAS=CANONICAL"; repeatable.
    #[arg(long = "alias", value_name = "ALIAS=CANONICAL")]
    aliases: Vec<String>,

    /// JSON file mapping aliases to canonical area names.
    #[arg(long, env = "DDR_ALIAS_FILE")]
    alias_file: Option<PathBuf>,

    /// Read the two reports one after the other instead of concurrently.
    #[arg(long, env = "DDR_SEQUENTIAL")]
    sequential: bool,

    /// Output the structured report as JSON instead of Markdown.
    #[arg(long, env = "DDR_JSON")]
    json: bool,

    /// Disable progress display.
    #[arg(long, env = "DDR_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DDR_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DDR_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "DDR_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "DDR_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinners carry the feedback; library INFO lines would tear them.
    let show_progress = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn PipelineProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;

    // ── Run ──────────────────────────────────────────────────────────────
    let output = diagnose(&cli.general, &cli.thermal, &config)
        .await
        .map_err(stage_tagged)?;

    let rendered = if cli.json {
        render_json(&output.report).context("Failed to serialise report")?
    } else {
        output.markdown.clone()
    };

    if let Some(ref output_path) = cli.output {
        write_atomic(output_path, &rendered)
            .await
            .context("Failed to write report")?;
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(rendered.as_bytes())
            .context("Failed to write to stdout")?;
    }

    // ── Summary ──────────────────────────────────────────────────────────
    if !cli.quiet {
        let conflicts = output.report.conflicts().count();
        eprintln!(
            "{}  {} area(s)  {} conflict(s)  {} gap(s)  {}ms{}",
            if conflicts == 0 { green("✔") } else { cyan("⚠") },
            output.report.findings.len(),
            conflicts,
            output.report.missing_information.len(),
            output.stats.total_duration_ms,
            cli.output
                .as_ref()
                .map(|p| format!("  →  {}", bold(&p.display().to_string())))
                .unwrap_or_default(),
        );
        eprintln!(
            "   {} tokens in  /  {} tokens out  across {} call(s)",
            dim(&output.stats.total_input_tokens().to_string()),
            dim(&output.stats.total_output_tokens().to_string()),
            output.stats.calls.len(),
        );
    }

    Ok(())
}

/// Prefix a pipeline error with the stage that raised it.
fn stage_tagged(e: DdrError) -> anyhow::Error {
    let context = match e.stage() {
        Some(stage) => format!("Diagnosis failed at stage '{stage}'"),
        None => "Diagnosis failed".to_string(),
    };
    anyhow::Error::new(e).context(context)
}

/// Map CLI args to `DdrConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<DdrConfig> {
    let mut aliases = match cli.alias_file {
        Some(ref path) => {
            let json = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read alias file {:?}", path))?;
            AreaAliases::from_json(&json)
                .with_context(|| format!("Invalid alias file {:?}", path))?
        }
        None => AreaAliases::new(),
    };
    for pair in &cli.aliases {
        let (alias, canonical) = AreaAliases::parse_pair(pair)?;
        aliases.insert(&alias, &canonical)?;
    }

    let mut builder = DdrConfig::builder()
        .dpi(cli.dpi)
        .thermal_pages(parse_pages(&cli.thermal_pages)?)
        .max_tokens(cli.max_tokens)
        .extraction_temperature(cli.extraction_temperature)
        .synthesis_temperature(cli.synthesis_temperature)
        .aliases(aliases)
        .concurrent_extraction(!cli.sequential)
        .download_timeout_secs(cli.download_timeout)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Parse `--thermal-pages` string into `PageSelection`.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();

    if s == "all" {
        return Ok(PageSelection::All);
    }

    // Range: "3-15"
    if let Some((start, end)) = s.split_once('-') {
        let start: usize = start
            .trim()
            .parse()
            .context("Invalid start page in range")?;
        let end: usize = end.trim().parse().context("Invalid end page in range")?;

        if start < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", start);
        }
        if start > end {
            anyhow::bail!(
                "Invalid page range '{}-{}': start must be <= end",
                start,
                end
            );
        }

        return Ok(PageSelection::Range(start, end));
    }

    // Set: "1,3,5,7"
    if s.contains(',') {
        let pages: Vec<usize> = s
            .split(',')
            .map(|p| {
                p.trim()
                    .parse::<usize>()
                    .with_context(|| format!("Invalid page number: '{}'", p.trim()))
            })
            .collect::<Result<Vec<_>>>()?;

        if let Some(&p) = pages.iter().find(|&&p| p < 1) {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", p);
        }

        return Ok(PageSelection::Set(pages));
    }

    // Single page: "5"
    let page: usize = s.parse().context("Invalid page number")?;
    if page < 1 {
        anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", page);
    }

    Ok(PageSelection::Single(page))
}
