//! Plain-text extraction from docx, pdf, and txt uploads.
//!
//! The extractors are deliberately small: a docx is a zip whose
//! `word/document.xml` carries the text runs, and minute-style PDFs keep
//! their text in `Tj`/`TJ` operators (optionally flate-compressed). Anything
//! beyond that is out of scope for minute ingestion.

use std::io::{Cursor, Read};

use tracing::debug;

use crate::error::{ServiceError, ServiceResult};

/// Extracts text from an uploaded document by extension.
pub fn extract_text(filename: &str, bytes: &[u8]) -> ServiceResult<String> {
    let extension = filename
        .rsplit('.')
        .next()
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let raw = match extension.as_str() {
        "txt" | "md" => String::from_utf8_lossy(bytes).into_owned(),
        "docx" => extract_docx(bytes)?,
        "pdf" => extract_pdf(bytes)?,
        other => {
            return Err(ServiceError::UnsupportedFormat(format!(
                "unknown document extension: .{}",
                other
            )))
        }
    };

    let text = collapse_blank_lines(&raw);
    debug!(filename, chars = text.len(), "document text extracted");
    Ok(text)
}

/// Collapses runs of two or more blank lines down to exactly two blank
/// lines; a single blank line passes through unchanged.
fn collapse_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0usize;
    for line in text.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
            if blank_run >= 2 {
                out.push_str("\n\n");
            } else if blank_run == 1 {
                out.push('\n');
            }
        }
        out.push_str(line.trim_end());
        blank_run = 0;
    }
    out
}

// --- docx ---

fn extract_docx(bytes: &[u8]) -> ServiceResult<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ServiceError::UnsupportedFormat(format!("not a docx archive: {}", e)))?;

    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| ServiceError::UnsupportedFormat(format!("docx missing document.xml: {}", e)))?
        .read_to_string(&mut xml)
        .map_err(|e| ServiceError::Internal(format!("docx read failed: {}", e)))?;

    Ok(docx_xml_to_text(&xml))
}

/// Walks the WordprocessingML stream: `<w:p>` closes a paragraph, `<w:tab/>`
/// and `<w:br/>` insert separators, and character data inside `<w:t>` runs
/// is collected.
fn docx_xml_to_text(xml: &str) -> String {
    let mut out = String::new();
    let mut rest = xml;
    let mut in_text_run = false;

    while let Some(open) = rest.find('<') {
        if in_text_run {
            out.push_str(&unescape_xml(&rest[..open]));
        }
        let Some(close) = rest[open..].find('>') else {
            break;
        };
        let tag = &rest[open + 1..open + close];
        let self_closing = tag.ends_with('/');
        let name = tag
            .trim_end_matches('/')
            .split_whitespace()
            .next()
            .unwrap_or("");

        match name {
            "w:t" => in_text_run = !self_closing,
            "/w:t" => in_text_run = false,
            "/w:p" => out.push('\n'),
            "w:tab" => out.push('\t'),
            "w:br" => out.push('\n'),
            _ => {}
        }

        rest = &rest[open + close + 1..];
    }

    out
}

fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

// --- pdf ---

fn extract_pdf(bytes: &[u8]) -> ServiceResult<String> {
    if !bytes.starts_with(b"%PDF") {
        return Err(ServiceError::UnsupportedFormat("not a PDF file".into()));
    }

    let mut pages = Vec::new();
    for stream in pdf_streams(bytes) {
        let content = match inflate(&stream) {
            Some(inflated) => inflated,
            None => stream,
        };
        let text = pdf_content_text(&content);
        if !text.trim().is_empty() {
            pages.push(text);
        }
    }

    Ok(pages.join("\n"))
}

/// Raw bytes of every `stream … endstream` object.
fn pdf_streams(bytes: &[u8]) -> Vec<Vec<u8>> {
    let mut streams = Vec::new();
    let mut offset = 0usize;
    while let Some(start) = find_bytes(&bytes[offset..], b"stream") {
        let mut begin = offset + start + b"stream".len();
        // Skip the EOL that terminates the keyword.
        while begin < bytes.len() && (bytes[begin] == b'\r' || bytes[begin] == b'\n') {
            begin += 1;
        }
        let Some(end) = find_bytes(&bytes[begin..], b"endstream") else {
            break;
        };
        streams.push(bytes[begin..begin + end].to_vec());
        offset = begin + end + b"endstream".len();
    }
    streams
}

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn inflate(data: &[u8]) -> Option<Vec<u8>> {
    let mut decoder = flate2::read::ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out).ok()?;
    Some(out)
}

/// Collects the string operands of `Tj`/`TJ`/`'` operators. `Td`/`TD`/`T*`
/// become line breaks so paragraph structure survives.
fn pdf_content_text(content: &[u8]) -> String {
    let text = String::from_utf8_lossy(content);
    let mut out = String::new();
    let mut chars = text.chars().peekable();
    let mut pending = String::new();

    while let Some(c) = chars.next() {
        match c {
            '(' => {
                let mut literal = String::new();
                let mut depth = 1usize;
                while let Some(inner) = chars.next() {
                    match inner {
                        '\\' => {
                            if let Some(escaped) = chars.next() {
                                match escaped {
                                    'n' => literal.push('\n'),
                                    't' => literal.push('\t'),
                                    '(' | ')' | '\\' => literal.push(escaped),
                                    _ => {}
                                }
                            }
                        }
                        '(' => {
                            depth += 1;
                            literal.push('(');
                        }
                        ')' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                            literal.push(')');
                        }
                        other => literal.push(other),
                    }
                }
                pending.push_str(&literal);
            }
            'T' => match chars.peek() {
                Some('j') | Some('J') => {
                    chars.next();
                    out.push_str(&pending);
                    pending.clear();
                }
                Some('d') | Some('D') | Some('*') => {
                    chars.next();
                    if !out.is_empty() && !out.ends_with('\n') {
                        out.push('\n');
                    }
                }
                _ => {}
            },
            '\'' => {
                out.push('\n');
                out.push_str(&pending);
                pending.clear();
            }
            _ => {}
        }
    }

    out
}
