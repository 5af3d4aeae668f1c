//! pdfium access: bind the library, read page text, rasterise pages.
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which keeps
//! thread-local state and must not be driven from async code. Every public
//! function here moves its work onto `tokio::task::spawn_blocking`.
//!
//! Page size is capped by `max_rendered_pixels` on the longest edge rather
//! than by DPI alone: an A0 poster at 150 DPI would otherwise become a
//! 7,000 × 10,000 px image.

use crate::config::DdrConfig;
use crate::error::{DdrError, SourceError, Stage};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// PDF points per inch.
const POINTS_PER_INCH: f32 = 72.0;

/// Bind to a pdfium shared library.
///
/// Discovery order:
/// 1. `PDFIUM_LIB_PATH` env var (file or directory)
/// 2. Alongside the running executable
/// 3. System library search paths
pub fn bind_pdfium() -> Result<Pdfium, DdrError> {
    if let Ok(path) = std::env::var("PDFIUM_LIB_PATH") {
        let candidate = if Path::new(&path).is_dir() {
            Pdfium::pdfium_platform_library_name_at_path(&path)
        } else {
            PathBuf::from(&path)
        };
        debug!("Binding pdfium from PDFIUM_LIB_PATH: {}", candidate.display());
        let bindings = Pdfium::bind_to_library(&candidate)
            .map_err(|e| DdrError::PdfiumBindingFailed(format!("{}: {e:?}", candidate.display())))?;
        return Ok(Pdfium::new(bindings));
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let lib = Pdfium::pdfium_platform_library_name_at_path(dir);
            if let Ok(bindings) = Pdfium::bind_to_library(&lib) {
                debug!("Bound pdfium next to executable: {}", lib.display());
                return Ok(Pdfium::new(bindings));
            }
        }
    }

    let bindings = Pdfium::bind_to_system_library()
        .map_err(|e| DdrError::PdfiumBindingFailed(format!("{e:?}")))?;
    Ok(Pdfium::new(bindings))
}

/// Read the text of every page of the general report.
///
/// Pages are joined with a blank line. A document whose pages hold no text
/// at all (e.g. a scan) is an extraction failure, not an empty report.
pub async fn extract_text(pdf_path: &Path, password: Option<&str>) -> Result<String, DdrError> {
    let path = pdf_path.to_path_buf();
    let password = password.map(str::to_string);

    tokio::task::spawn_blocking(move || extract_text_blocking(&path, password.as_deref()))
        .await
        .map_err(|e| DdrError::Internal(format!("Text extraction task panicked: {e}")))?
}

fn extract_text_blocking(pdf_path: &Path, password: Option<&str>) -> Result<String, DdrError> {
    let stage = Stage::GeneralExtraction;
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_file(pdf_path, password)
        .map_err(|e| DdrError::extraction(stage, map_load_error(&e, pdf_path, password)))?;

    let mut page_texts = Vec::new();
    for (idx, page) in document.pages().iter().enumerate() {
        let text = page.text().map_err(|e| {
            DdrError::extraction(
                stage,
                SourceError::PageFailed {
                    page: idx + 1,
                    detail: format!("{e:?}"),
                },
            )
        })?;
        page_texts.push(text.all());
    }
    info!("General report loaded: {} pages", page_texts.len());

    let text = join_page_text(&page_texts);
    if text.is_empty() {
        return Err(DdrError::extraction(
            stage,
            SourceError::NoUsableContent(format!(
                "'{}' has no extractable text (scanned document?)",
                pdf_path.display()
            )),
        ));
    }
    debug!("Extracted {} chars of report text", text.len());
    Ok(text)
}

/// Rasterise the selected pages of the thermal report.
///
/// # Returns
/// `(page_index_0based, image)` tuples in page order.
pub async fn render_pages(
    pdf_path: &Path,
    config: &DdrConfig,
) -> Result<Vec<(usize, DynamicImage)>, DdrError> {
    let path = pdf_path.to_path_buf();
    let opts = RenderOptions {
        dpi: config.dpi,
        max_pixels: config.max_rendered_pixels,
        password: config.password.clone(),
        selection: config.thermal_pages.clone(),
    };

    tokio::task::spawn_blocking(move || render_pages_blocking(&path, &opts))
        .await
        .map_err(|e| DdrError::Internal(format!("Render task panicked: {e}")))?
}

struct RenderOptions {
    dpi: u32,
    max_pixels: u32,
    password: Option<String>,
    selection: crate::config::PageSelection,
}

fn render_pages_blocking(
    pdf_path: &Path,
    opts: &RenderOptions,
) -> Result<Vec<(usize, DynamicImage)>, DdrError> {
    let stage = Stage::ThermalExtraction;
    let password = opts.password.as_deref();
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_file(pdf_path, password)
        .map_err(|e| DdrError::extraction(stage, map_load_error(&e, pdf_path, password)))?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("Thermal report loaded: {} pages", total_pages);

    let indices = opts.selection.to_indices(total_pages);
    if indices.is_empty() {
        return Err(DdrError::extraction(
            stage,
            SourceError::NoPagesSelected { total: total_pages },
        ));
    }

    let page_failed = |idx: usize, detail: String| {
        DdrError::extraction(
            stage,
            SourceError::PageFailed {
                page: idx + 1,
                detail,
            },
        )
    };

    let mut results = Vec::with_capacity(indices.len());
    for idx in indices {
        let page_index = u16::try_from(idx)
            .map_err(|_| page_failed(idx, "page index exceeds u16".into()))?;
        let page = pages
            .get(page_index)
            .map_err(|e| page_failed(idx, format!("{e:?}")))?;

        let (w, h) = render_dimensions(
            page.width().value,
            page.height().value,
            opts.dpi,
            opts.max_pixels,
        );
        let render_config = PdfRenderConfig::new()
            .set_target_width(w as i32)
            .set_maximum_height(h as i32);

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| page_failed(idx, format!("{e:?}")))?;
        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );
        results.push((idx, image));
    }

    Ok(results)
}

/// Pixel size for a page at `dpi`, with the longest edge capped at `max_pixels`.
fn render_dimensions(width_points: f32, height_points: f32, dpi: u32, max_pixels: u32) -> (u32, u32) {
    let scale = dpi as f32 / POINTS_PER_INCH;
    let raw_w = (width_points * scale).max(1.0);
    let raw_h = (height_points * scale).max(1.0);

    let longest = raw_w.max(raw_h);
    if longest > max_pixels as f32 {
        let ratio = max_pixels as f32 / longest;
        warn!(
            "Page of {}x{} px exceeds {} px cap; scaling down",
            raw_w as u32, raw_h as u32, max_pixels
        );
        (
            ((raw_w * ratio).round() as u32).clamp(1, max_pixels),
            ((raw_h * ratio).round() as u32).clamp(1, max_pixels),
        )
    } else {
        (raw_w.round() as u32, raw_h.round() as u32)
    }
}

/// Classify a pdfium load error, recognising encrypted documents.
fn map_load_error(e: &PdfiumError, path: &Path, password: Option<&str>) -> SourceError {
    classify_load_error(&format!("{e:?}"), path, password.is_some())
}

fn classify_load_error(detail: &str, path: &Path, had_password: bool) -> SourceError {
    let lower = detail.to_lowercase();
    let path = path.to_path_buf();
    if lower.contains("password") || lower.contains("encrypt") {
        if had_password {
            SourceError::WrongPassword { path }
        } else {
            SourceError::PasswordRequired { path }
        }
    } else {
        SourceError::CorruptPdf {
            path,
            detail: detail.to_string(),
        }
    }
}

/// Join non-blank page texts with a blank line between pages.
fn join_page_text(pages: &[String]) -> String {
    pages
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}
