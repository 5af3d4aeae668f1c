//! End-to-end integration tests for edgequake-ddr.
//!
//! These tests use real PDF files in `./test_cases/` and make live LLM API
//! calls.  They are gated behind the `E2E_ENABLED` environment variable so
//! they do not run in CI unless explicitly requested.
//!
//! Expected files:
//!   test_cases/sample_inspection.pdf   text-based general inspection report
//!   test_cases/sample_thermal.pdf      thermal-imaging report
//!
//! Run with:
//!   E2E_ENABLED=1 DYLD_LIBRARY_PATH=. cargo test --test e2e -- --nocapture

use edgequake_ddr::{
    diagnose, diagnose_to_file, DdrConfig, DdrError, PageSelection, SourceError, Stage,
    NOT_AVAILABLE,
};
use std::path::PathBuf;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

fn output_dir() -> PathBuf {
    let d = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases/output");
    std::fs::create_dir_all(&d).ok();
    d
}

/// Skip this test if E2E_ENABLED is not set *or* either PDF is missing.
macro_rules! e2e_skip_unless_ready {
    ($general:expr, $thermal:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let g: PathBuf = $general;
        let t: PathBuf = $thermal;
        for p in [&g, &t] {
            if !p.exists() {
                println!("SKIP — test file not found: {}", p.display());
                return;
            }
        }
        (g, t)
    }};
}

fn sample_pair() -> (PathBuf, PathBuf) {
    (
        test_cases_dir().join("sample_inspection.pdf"),
        test_cases_dir().join("sample_thermal.pdf"),
    )
}

/// The seven DDR sections appear once each, in order.
fn assert_ddr_shape(md: &str, context: &str) {
    assert!(
        md.starts_with("# Detailed Diagnostic Report (DDR)"),
        "[{context}] missing title"
    );
    let mut last = 0;
    for n in 1..=7 {
        let heading = format!("\n## {n}. ");
        let pos = md
            .find(&heading)
            .unwrap_or_else(|| panic!("[{context}] missing section {n}"));
        assert!(pos > last, "[{context}] section {n} out of order");
        last = pos;
    }
    assert!(md.ends_with('\n') && !md.ends_with("\n\n"), "[{context}] trailing newlines");
    println!("[{context}] ✓  {} bytes, DDR shape checks passed", md.len());
}

// ── Full pipeline ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_sample_reports_produce_ddr() {
    let (general, thermal) = e2e_skip_unless_ready!(sample_pair().0, sample_pair().1);

    let config = DdrConfig::default();
    let output = diagnose(
        general.to_str().unwrap(),
        thermal.to_str().unwrap(),
        &config,
    )
    .await
    .expect("diagnose() should succeed");

    assert_ddr_shape(&output.markdown, "sample");
    assert!(!output.report.findings.is_empty(), "expected at least one area");
    for f in &output.report.findings {
        assert_eq!(f.conflict_flag, !f.conflict_note.is_empty(), "area {}", f.area);
        assert!(!f.probable_root_cause.trim().is_empty());
        if f.thermal_summary == NOT_AVAILABLE {
            assert!(!f.conflict_flag, "single-source area {} cannot conflict", f.area);
        }
    }

    println!(
        "areas={} conflicts={} tokens={}/{} in {}ms",
        output.report.findings.len(),
        output.report.conflicts().count(),
        output.stats.total_input_tokens(),
        output.stats.total_output_tokens(),
        output.stats.total_duration_ms
    );
}

#[tokio::test]
async fn test_sample_reports_to_file() {
    let (general, thermal) = e2e_skip_unless_ready!(sample_pair().0, sample_pair().1);

    let out = output_dir().join("sample_ddr.md");
    let _ = std::fs::remove_file(&out);

    let config = DdrConfig::builder()
        .thermal_pages(PageSelection::Range(1, 10))
        .concurrent_extraction(false)
        .build()
        .unwrap();
    let output = diagnose_to_file(
        general.to_str().unwrap(),
        thermal.to_str().unwrap(),
        &out,
        &config,
    )
    .await
    .expect("diagnose_to_file() should succeed");

    let written = std::fs::read_to_string(&out).expect("report written");
    assert_eq!(written, output.markdown);
    assert_ddr_shape(&written, "sample-to-file");
}

// ── Input errors (no LLM call is reached) ────────────────────────────────────

#[tokio::test]
async fn test_non_pdf_input_is_rejected() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let fake = dir.path().join("notes.pdf");
    std::fs::write(&fake, "plain text, not a PDF").unwrap();
    let (_, thermal) = sample_pair();

    let config = DdrConfig::builder().concurrent_extraction(false).build().unwrap();
    let err = diagnose(fake.to_str().unwrap(), thermal.to_str().unwrap(), &config)
        .await
        .unwrap_err();

    match err {
        DdrError::ExtractionFailure {
            stage: Stage::GeneralExtraction,
            source: SourceError::NotAPdf { .. },
        } => {}
        DdrError::ProviderNotConfigured { .. } => {
            println!("SKIP — no LLM provider configured");
        }
        other => panic!("unexpected error: {other}"),
    }
}
