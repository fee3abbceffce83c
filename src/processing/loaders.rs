//! Text extraction for uploaded documents.
//!
//! `.pdf` files go through `pdf-extract`; every other extension is opened as a DOCX archive and
//! the paragraph text of `word/document.xml` is collected. Parsing runs on the blocking pool.

use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while loading document text.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// The file could not be read from disk.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not a readable document of the expected format.
    #[error("unsupported or corrupt {format} file {path}: {reason}")]
    UnsupportedFormat {
        /// File being parsed.
        path: PathBuf,
        /// Format the loader expected.
        format: DocumentFormat,
        /// Parser diagnostic.
        reason: String,
    },
    /// The blocking extraction task was cancelled.
    #[error("document extraction task failed: {0}")]
    Task(String),
}

/// Loader selected from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    /// Portable Document Format.
    Pdf,
    /// Office Open XML word-processing document.
    Docx,
}

impl DocumentFormat {
    /// `.pdf` (any case) selects the PDF loader; anything else is treated as DOCX.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("pdf") => Self::Pdf,
            _ => Self::Docx,
        }
    }
}

impl std::fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pdf => f.write_str("PDF"),
            Self::Docx => f.write_str("DOCX"),
        }
    }
}

/// Read `path` and return its plain-text content.
pub async fn load_text(path: &Path) -> Result<String, LoaderError> {
    let format = DocumentFormat::from_path(path);
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| LoaderError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    let owned_path = path.to_path_buf();
    let text = tokio::task::spawn_blocking(move || match format {
        DocumentFormat::Pdf => extract_pdf(&bytes, &owned_path),
        DocumentFormat::Docx => extract_docx(&bytes, &owned_path),
    })
    .await
    .map_err(|error| {
        if error.is_panic() {
            LoaderError::UnsupportedFormat {
                path: path.to_path_buf(),
                format,
                reason: "parser panicked on malformed input".into(),
            }
        } else {
            LoaderError::Task(error.to_string())
        }
    })??;

    tracing::debug!(path = %path.display(), %format, chars = text.chars().count(), "Document text loaded");
    Ok(text)
}

fn extract_pdf(bytes: &[u8], path: &Path) -> Result<String, LoaderError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|error| LoaderError::UnsupportedFormat {
        path: path.to_path_buf(),
        format: DocumentFormat::Pdf,
        reason: error.to_string(),
    })
}

fn extract_docx(bytes: &[u8], path: &Path) -> Result<String, LoaderError> {
    let unsupported = |reason: String| LoaderError::UnsupportedFormat {
        path: path.to_path_buf(),
        format: DocumentFormat::Docx,
        reason,
    };

    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|error| unsupported(error.to_string()))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|error| unsupported(format!("word/document.xml: {error}")))?
        .read_to_string(&mut xml)
        .map_err(|error| unsupported(format!("word/document.xml: {error}")))?;

    Ok(document_xml_to_text(&xml))
}

/// Collect run text from WordprocessingML, one line per paragraph.
fn document_xml_to_text(xml: &str) -> String {
    let mut text = String::new();
    let mut rest = xml;
    let mut in_text = false;

    while let Some(start) = rest.find('<') {
        if in_text {
            text.push_str(&decode_entities(&rest[..start]));
        }
        let Some(len) = rest[start..].find('>') else {
            break;
        };
        let tag = &rest[start + 1..start + len];
        rest = &rest[start + len + 1..];

        let self_closing = tag.ends_with('/');
        let name = tag
            .trim_end_matches('/')
            .split_whitespace()
            .next()
            .unwrap_or_default();
        match name {
            "w:t" => in_text = !self_closing,
            "/w:t" => in_text = false,
            "w:tab" => text.push('\t'),
            "w:br" | "w:cr" => text.push('\n'),
            "/w:p" => text.push('\n'),
            _ => {}
        }
    }

    text
}

fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }

    let mut decoded = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        decoded.push_str(&rest[..amp]);
        let candidate = &rest[amp..];
        let replacement = candidate.find(';').and_then(|semi| {
            let entity = &candidate[1..semi];
            let ch = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .map(|hex| u32::from_str_radix(hex, 16))
                    .or_else(|| entity.strip_prefix('#').map(str::parse::<u32>))
                    .and_then(Result::ok)
                    .and_then(char::from_u32),
            };
            ch.map(|ch| (ch, semi + 1))
        });
        match replacement {
            Some((ch, consumed)) => {
                decoded.push(ch);
                rest = &candidate[consumed..];
            }
            None => {
                decoded.push('&');
                rest = &candidate[1..];
            }
        }
    }
    decoded.push_str(rest);
    decoded
}
