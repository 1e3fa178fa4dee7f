//! File report generation - CSV and PDF formats

use printpdf::{BuiltinFont, IndirectFontRef, Line, Mm, PdfDocument, PdfLayerReference, Point};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use crate::comparison::ComparisonTable;
use crate::error::{ReportError, Result};

/// Format for file output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Csv,
    Pdf,
}

impl FromStr for ReportFormat {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "CSV" => Ok(ReportFormat::Csv),
            "PDF" => Ok(ReportFormat::Pdf),
            other => Err(ReportError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl std::fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportFormat::Csv => write!(f, "CSV"),
            ReportFormat::Pdf => write!(f, "PDF"),
        }
    }
}

/// Write `table` to `path` in the format named by `format`.
///
/// The format is resolved before anything touches the filesystem.
pub fn write_report(table: &ComparisonTable, format: &str, path: &Path) -> Result<()> {
    let format = ReportFormat::from_str(format)?;
    save(table, format, path)
}

pub fn save(table: &ComparisonTable, format: ReportFormat, path: &Path) -> Result<()> {
    match format {
        ReportFormat::Csv => write_csv(table, path),
        ReportFormat::Pdf => write_pdf(table, path),
    }?;
    tracing::info!(path = %path.display(), %format, "report written");
    Ok(())
}

/// Refuses to overwrite an existing file.
fn create_new(path: &Path) -> Result<File> {
    Ok(OpenOptions::new().write(true).create_new(true).open(path)?)
}

pub fn write_csv(table: &ComparisonTable, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_writer(create_new(path)?);
    for record in table.to_records() {
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

// Page geometry in millimetres, A4 portrait.
const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 10.0;
const BREAK_MARGIN: f32 = 15.0;

const CELL_WIDTH: f32 = 40.0;
const CELL_HEIGHT: f32 = 10.0;
const CELL_PADDING: f32 = 1.0;
const TITLE_WIDTH: f32 = 200.0;

const TITLE_SIZE: f32 = 12.0;
const BODY_SIZE: f32 = 10.0;

const PT_TO_MM: f32 = 0.352_778;
const LAYER: &str = "Layer 1";
const PDF_TITLE: &str = "Report SEO";

/// One piece of text on a page, positioned from the top-left corner.
#[derive(Debug, Clone, PartialEq)]
struct Cell {
    x: f32,
    y: f32,
    text: String,
    size: f32,
    bold: bool,
    bordered: bool,
}

/// Rough Helvetica advance width, used only to centre the title.
fn approx_text_width(text: &str, size: f32) -> f32 {
    text.chars().count() as f32 * size * PT_TO_MM * 0.5
}

/// Place the title and every table cell, starting a new page whenever the
/// next row would run into the bottom margin. Every cell is 40x10 mm
/// whatever its content, so long values run past their border.
fn layout(table: &ComparisonTable) -> Vec<Vec<Cell>> {
    let mut pages = vec![Vec::new()];
    let mut y = MARGIN;

    pages[0].push(Cell {
        x: MARGIN + (TITLE_WIDTH - approx_text_width(PDF_TITLE, TITLE_SIZE)) / 2.0,
        y,
        text: PDF_TITLE.to_string(),
        size: TITLE_SIZE,
        bold: true,
        bordered: false,
    });
    y += 2.0 * CELL_HEIGHT;

    for record in table.to_records() {
        if y + CELL_HEIGHT > PAGE_HEIGHT - BREAK_MARGIN {
            pages.push(Vec::new());
            y = MARGIN;
        }
        let page = pages.len() - 1;
        for (i, text) in record.into_iter().enumerate() {
            pages[page].push(Cell {
                x: MARGIN + i as f32 * CELL_WIDTH,
                y,
                text,
                size: BODY_SIZE,
                bold: false,
                bordered: true,
            });
        }
        y += CELL_HEIGHT;
    }
    pages
}

fn pdf_error<E: std::fmt::Debug>(e: E) -> ReportError {
    ReportError::Pdf(format!("{:?}", e))
}

fn draw(layer: &PdfLayerReference, cell: &Cell, font: &IndirectFontRef) {
    if cell.bordered {
        let top = PAGE_HEIGHT - cell.y;
        let bottom = top - CELL_HEIGHT;
        let right = cell.x + CELL_WIDTH;
        layer.add_line(Line {
            points: vec![
                (Point::new(Mm(cell.x), Mm(top)), false),
                (Point::new(Mm(right), Mm(top)), false),
                (Point::new(Mm(right), Mm(bottom)), false),
                (Point::new(Mm(cell.x), Mm(bottom)), false),
            ],
            is_closed: true,
        });
    }

    // Vertically centred in a CELL_HEIGHT band starting at cell.y.
    let baseline = cell.y + CELL_HEIGHT / 2.0 + 0.3 * cell.size * PT_TO_MM;
    let x = if cell.bordered { cell.x + CELL_PADDING } else { cell.x };
    layer.use_text(
        cell.text.as_str(),
        cell.size,
        Mm(x),
        Mm(PAGE_HEIGHT - baseline),
        font,
    );
}

fn render_pdf(pages: &[Vec<Cell>]) -> Result<Vec<u8>> {
    let (doc, first_page, first_layer) =
        PdfDocument::new(PDF_TITLE, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), LAYER);
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(pdf_error)?;
    let regular = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(pdf_error)?;

    for (n, cells) in pages.iter().enumerate() {
        let (page, layer) = if n == 0 {
            (first_page, first_layer)
        } else {
            doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), LAYER)
        };
        let layer = doc.get_page(page).get_layer(layer);
        for cell in cells {
            draw(&layer, cell, if cell.bold { &bold } else { &regular });
        }
    }

    doc.save_to_bytes().map_err(pdf_error)
}

/// The document is rendered in memory first, so a rendering failure never
/// leaves a file behind.
pub fn write_pdf(table: &ComparisonTable, path: &Path) -> Result<()> {
    let pages = layout(table);
    let bytes = render_pdf(&pages)?;

    let mut writer = BufWriter::new(create_new(path)?);
    writer.write_all(&bytes)?;
    writer.flush()?;
    tracing::debug!(pages = pages.len(), "pdf rendered");
    Ok(())
}
