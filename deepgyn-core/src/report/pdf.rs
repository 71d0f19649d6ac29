//! PDF rendering of a [`ReportDocument`] with `genpdf`.

use chrono::Local;
use genpdf::elements::{Break, FrameCellDecorator, Paragraph, TableLayout};
use genpdf::fonts::{FontData, FontFamily};
use genpdf::style::{Color, Style, StyledString};
use genpdf::{Alignment, Document, Element as _, SimplePageDecorator};
use std::path::{Path, PathBuf};

use super::{ImpressionColor, ReportDocument, ReportRequest, generate_patient_id};
use crate::config::ReportConfig;
use crate::error::{DeepGynError, Result};

const BRAND_CYAN: Color = Color::Rgb(0x00, 0xd2, 0xff);
const GREY: Color = Color::Rgb(0x80, 0x80, 0x80);

/// System directories searched when no font directory is configured.
const FONT_DIRS: &[&str] = &[
    "",
    "/usr/share/fonts/truetype/liberation",
    "/usr/share/fonts/liberation",
    "/usr/share/fonts/truetype/liberation2",
    "/System/Library/Fonts",
    "/Library/Fonts",
];

/// Families tried in every search directory after the configured one.
const FALLBACK_FAMILIES: &[&str] = &["Helvetica", "Arial"];

/// DejaVu Sans, shipped with the crate so rendering never depends on the host.
const BUNDLED_REGULAR: &[u8] = include_bytes!("../../fonts/DejaVuSans.ttf");
const BUNDLED_BOLD: &[u8] = include_bytes!("../../fonts/DejaVuSans-Bold.ttf");

/// Load the bundled DejaVu Sans family. Italic faces reuse the upright ones.
fn bundled_fonts() -> Result<FontFamily<FontData>> {
    let regular = FontData::new(BUNDLED_REGULAR.to_vec(), None)?;
    let bold = FontData::new(BUNDLED_BOLD.to_vec(), None)?;
    Ok(FontFamily {
        italic: regular.clone(),
        bold_italic: bold.clone(),
        regular,
        bold,
    })
}

/// A fully rendered report: the PDF bytes and the layout they were drawn from.
#[derive(Debug, Clone)]
pub struct RenderedReport {
    pub document: ReportDocument,
    pub bytes: Vec<u8>,
}

/// Renders [`ReportRequest`]s with the configured letterhead and fonts.
#[derive(Debug, Clone)]
pub struct ReportRenderer {
    config: ReportConfig,
}

impl ReportRenderer {
    pub fn new(config: ReportConfig) -> Self {
        Self { config }
    }

    pub fn filename(&self) -> &str {
        &self.config.filename
    }

    /// Resolve the font family used for rendering.
    ///
    /// An explicit `font_dir` must contain the configured family. Otherwise the
    /// configured family, then Helvetica and Arial, are looked up in the system
    /// font directories, and the bundled DejaVu Sans is used when none is found.
    pub fn load_fonts(&self) -> Result<FontFamily<FontData>> {
        let family = &self.config.font_family;
        if let Some(dir) = &self.config.font_dir {
            return genpdf::fonts::from_files(dir, family, None).map_err(|e| {
                DeepGynError::render_caused(
                    format!("cannot load font '{family}' from {}", dir.display()),
                    e,
                )
            });
        }
        let families = std::iter::once(family.as_str()).chain(FALLBACK_FAMILIES.iter().copied());
        for name in families {
            let found = FONT_DIRS
                .iter()
                .find_map(|dir| genpdf::fonts::from_files(Path::new(dir), name, None).ok());
            if let Some(fonts) = found {
                tracing::debug!(family = name, "using system font");
                return Ok(fonts);
            }
        }
        tracing::debug!(
            family = %family,
            "no system font found, using bundled DejaVu Sans"
        );
        bundled_fonts()
    }

    /// Build and render a report. Only a complete document is ever returned.
    pub fn render(&self, request: &ReportRequest) -> Result<RenderedReport> {
        let patient_id = request
            .patient_id
            .clone()
            .unwrap_or_else(generate_patient_id);
        let document = ReportDocument::build(
            request,
            &self.config,
            Local::now().date_naive(),
            &patient_id,
        )?;
        let fonts = self.load_fonts()?;
        let bytes = render_document(&document, fonts)?;
        tracing::debug!(
            bytes = bytes.len(),
            category = %document.impression.category,
            "report rendered"
        );
        Ok(RenderedReport { document, bytes })
    }

    /// Render and write to `path`, creating parent directories.
    pub fn render_to_file(&self, request: &ReportRequest, path: &Path) -> Result<PathBuf> {
        let rendered = self.render(request)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                DeepGynError::render_caused(format!("cannot create {}", parent.display()), e)
            })?;
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &rendered.bytes).map_err(|e| {
            DeepGynError::render_caused(format!("cannot write {}", tmp.display()), e)
        })?;
        std::fs::rename(&tmp, path).map_err(|e| {
            DeepGynError::render_caused(format!("cannot move report to {}", path.display()), e)
        })?;
        Ok(path.to_path_buf())
    }
}

fn color(c: ImpressionColor) -> Color {
    let (r, g, b) = c.rgb();
    Color::Rgb(r, g, b)
}

fn styled(text: &str, style: Style) -> Paragraph {
    Paragraph::new(StyledString::new(text.to_string(), style))
}

/// Draw `document` into an in-memory PDF.
pub fn render_document(document: &ReportDocument, fonts: FontFamily<FontData>) -> Result<Vec<u8>> {
    let mut doc = Document::new(fonts);
    doc.set_title(format!("DeepGynScan Report - {}", document.impression.category));
    doc.set_minimal_conformance();
    doc.set_font_size(10);
    doc.set_line_spacing(1.2);

    let mut decorator = SimplePageDecorator::new();
    decorator.set_margins(10);
    doc.set_page_decorator(decorator);

    // Header: brand on the left, lab details right-aligned.
    let head = &document.letterhead;
    let mut header = TableLayout::new(vec![1, 3]);
    let mut lab = genpdf::elements::LinearLayout::vertical();
    lab.push(styled(&head.lab_name, Style::new().bold().with_font_size(9)).aligned(Alignment::Right));
    for line in [&head.address, &head.licence, &head.phone] {
        lab.push(styled(line, Style::new().with_font_size(9)).aligned(Alignment::Right));
    }
    header
        .row()
        .element(styled(
            &head.brand,
            Style::new().bold().with_font_size(14).with_color(BRAND_CYAN),
        ))
        .element(lab)
        .push()?;
    doc.push(header);
    doc.push(Break::new(1.5));

    doc.push(
        styled(&document.title, Style::new().bold().with_font_size(18)).aligned(Alignment::Center),
    );
    doc.push(Break::new(1));

    // Demographics grid.
    let mut grid = TableLayout::new(vec![2, 4, 2, 4]);
    grid.set_cell_decorator(FrameCellDecorator::new(true, true, false));
    for [(l1, v1), (l2, v2)] in &document.demographics {
        grid.row()
            .element(styled(l1, Style::new().bold()).padded(1))
            .element(Paragraph::new(v1.as_str()).padded(1))
            .element(styled(l2, Style::new().bold()).padded(1))
            .element(Paragraph::new(v2.as_str()).padded(1))
            .push()?;
    }
    doc.push(grid);
    doc.push(Break::new(1.5));

    // Clinical impression.
    let impression = &document.impression;
    doc.push(styled("CLINICAL IMPRESSION:", Style::new().bold().with_font_size(12)));
    doc.push(styled(
        &impression.category,
        Style::new()
            .bold()
            .with_font_size(14)
            .with_color(color(impression.color)),
    ));
    doc.push(Break::new(0.5));
    let mut confidence = Paragraph::default();
    confidence.push_styled("AI Model Confidence: ", Style::new().bold());
    confidence.push(impression.confidence.as_str());
    doc.push(confidence);
    doc.push(Break::new(1.5));

    // Breakdown table.
    doc.push(styled(
        "Detailed Class Probabilities:",
        Style::new().bold().with_font_size(11),
    ));
    doc.push(Break::new(0.5));
    let mut table = TableLayout::new(vec![2, 2, 1]);
    table.set_cell_decorator(FrameCellDecorator::new(true, true, false));
    let header_style = Style::new().bold().with_color(BRAND_CYAN);
    let mut header_row = table.row();
    for title in ["Class Name", "Risk Category", "Probability Score"] {
        header_row.push_element(
            styled(title, header_style)
                .aligned(Alignment::Center)
                .padded(1),
        );
    }
    header_row.push()?;
    for row in &document.breakdown {
        table
            .row()
            .element(Paragraph::new(row.class_name.as_str()).aligned(Alignment::Center).padded(1))
            .element(
                styled(&row.category, Style::new().with_color(color(row.color)))
                    .aligned(Alignment::Center)
                    .padded(1),
            )
            .element(Paragraph::new(row.probability.as_str()).aligned(Alignment::Center).padded(1))
            .push()?;
    }
    doc.push(table);
    doc.push(Break::new(3));

    // Signatures.
    let sig_style = Style::new().with_font_size(8).with_color(GREY);
    let mut signatures = TableLayout::new(vec![1, 1]);
    signatures
        .row()
        .element(styled("_______________________", sig_style).aligned(Alignment::Center))
        .element(styled("_______________________", sig_style).aligned(Alignment::Center))
        .push()?;
    signatures
        .row()
        .element(styled(&document.signatures[0], sig_style).aligned(Alignment::Center))
        .element(styled(&document.signatures[1], sig_style).aligned(Alignment::Center))
        .push()?;
    doc.push(signatures);
    doc.push(Break::new(1));

    let footer_style = Style::new().with_font_size(7).with_color(GREY);
    let mut disclaimer = Paragraph::default();
    disclaimer.push_styled("DISCLAIMER: ", footer_style.bold());
    disclaimer.push_styled(document.disclaimer.as_str(), footer_style);
    doc.push(disclaimer);

    let mut buf = Vec::new();
    doc.render(&mut buf)?;
    Ok(buf)
}
