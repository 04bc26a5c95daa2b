//! Local PDF publisher.
//!
//! Writes the report as a plain-text PDF 1.4 document using the built-in
//! Helvetica font, so publishing needs neither network access nor credentials.

use async_trait::async_trait;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::info;

use super::protocols::{PublishAdapter, PublishReceipt};
use crate::core::AnalysisReport;
use crate::errors::AdapterError;

const ADAPTER_NAME: &str = "pdf";
const PAGE_WIDTH: u32 = 612;
const PAGE_HEIGHT: u32 = 792;
const MARGIN: u32 = 54;
const FONT_SIZE: u32 = 11;
const LEADING: u32 = 14;
const LINES_PER_PAGE: usize = 48;
const WRAP_COLUMNS: usize = 90;
const MAX_STEM_LEN: usize = 80;

/// Publishes reports as PDF files under a local directory.
#[derive(Debug, Clone)]
pub struct LocalPdfPublisher {
    output_dir: PathBuf,
}

impl LocalPdfPublisher {
    /// Creates a publisher writing into `output_dir`.
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// The directory reports are written to.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// The file a report with this title is written to.
    #[must_use]
    pub fn path_for(&self, title: &str) -> PathBuf {
        self.output_dir.join(format!("{}.pdf", file_stem(title)))
    }
}

#[async_trait]
impl PublishAdapter for LocalPdfPublisher {
    fn name(&self) -> &str {
        ADAPTER_NAME
    }

    async fn publish(&self, report: &AnalysisReport) -> Result<PublishReceipt, AdapterError> {
        let path = self.path_for(&report.title);
        let bytes = render_pdf(&report.to_markdown());

        tokio::fs::create_dir_all(&self.output_dir).await.map_err(|e| {
            AdapterError::unavailable(
                ADAPTER_NAME,
                format!("cannot create {}: {e}", self.output_dir.display()),
            )
        })?;
        tokio::fs::write(&path, &bytes).await.map_err(|e| {
            AdapterError::unavailable(ADAPTER_NAME, format!("cannot write {}: {e}", path.display()))
        })?;

        info!(path = %path.display(), bytes = bytes.len(), "Wrote PDF report");
        Ok(PublishReceipt::confirmed(path.display().to_string()))
    }
}

/// Turns a report title into a safe file stem.
fn file_stem(title: &str) -> String {
    let mut stem = String::new();
    let mut last_was_sep = true;
    for c in title.trim().chars() {
        if c.is_ascii_alphanumeric() {
            stem.push(c.to_ascii_lowercase());
            last_was_sep = false;
        } else if !last_was_sep && (c.is_whitespace() || c == '-' || c == '_') {
            stem.push('_');
            last_was_sep = true;
        }
    }
    let stem = stem.trim_end_matches('_');
    let stem: String = stem.chars().take(MAX_STEM_LEN).collect();
    if stem.is_empty() {
        "report".to_string()
    } else {
        stem
    }
}

/// Splits text into lines no wider than `WRAP_COLUMNS`, breaking on spaces.
fn wrap(text: &str) -> Vec<String> {
    let mut lines = Vec::new();
    for raw in text.lines() {
        let mut current = String::new();
        for word in raw.split_whitespace() {
            if !current.is_empty() && current.len() + 1 + word.len() > WRAP_COLUMNS {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
        lines.push(current);
    }
    lines
}

/// Escapes a line for a PDF literal string. Non-ASCII characters become `?`.
fn escape(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    for c in line.chars() {
        match c {
            '\\' | '(' | ')' => {
                out.push('\\');
                out.push(c);
            }
            ' '..='~' => out.push(c),
            '\t' => out.push(' '),
            _ => out.push('?'),
        }
    }
    out
}

fn page_stream(lines: &[String]) -> String {
    let mut stream = format!(
        "BT\n/F1 {FONT_SIZE} Tf\n{LEADING} TL\n{MARGIN} {} Td\n",
        PAGE_HEIGHT - MARGIN
    );
    for line in lines {
        let _ = writeln!(stream, "({}) Tj T*", escape(line));
    }
    stream.push_str("ET");
    stream
}

/// Renders text into a complete PDF document.
fn render_pdf(text: &str) -> Vec<u8> {
    let lines = wrap(text);
    let pages: Vec<&[String]> = if lines.is_empty() {
        vec![&[]]
    } else {
        lines.chunks(LINES_PER_PAGE).collect()
    };

    // Objects 1-3 are the catalog, page tree and font; each page then
    // takes two objects (page, content stream).
    let page_ids: Vec<usize> = (0..pages.len()).map(|i| 4 + i * 2).collect();
    let kids = page_ids
        .iter()
        .map(|id| format!("{id} 0 R"))
        .collect::<Vec<_>>()
        .join(" ");

    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!("<< /Type /Pages /Kids [{kids}] /Count {} >>", pages.len()),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
    ];
    for (page, id) in pages.iter().zip(&page_ids) {
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {PAGE_WIDTH} {PAGE_HEIGHT}] \
             /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
            id + 1
        ));
        let stream = page_stream(page);
        objects.push(format!(
            "<< /Length {} >>\nstream\n{stream}\nendstream",
            stream.len()
        ));
    }

    let mut out = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (index, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        let _ = write!(out, "{} 0 obj\n{body}\nendobj\n", index + 1);
    }

    let xref_offset = out.len();
    let _ = write!(out, "xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for offset in offsets {
        let _ = write!(out, "{offset:010} 00000 n \n");
    }
    let _ = write!(
        out,
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n",
        objects.len() + 1
    );
    out.into_bytes()
}
