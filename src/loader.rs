//! Document loaders keyed by file extension.
//!
//! A [`Loader`] turns one file into raw text segments (pages, paragraphs, or
//! the whole body). The pipeline joins segments with a blank line before
//! normalization. Unknown extensions have no loader and are skipped.

use encoding_rs::WINDOWS_1252;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use crate::error::{IngestError, Result};

/// Maximum decompressed bytes read from a single ZIP entry.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Extracts raw text segments from one file.
pub trait Loader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Vec<String>>;
}

/// Maps lowercase extensions to loaders.
#[derive(Clone, Default)]
pub struct LoaderRegistry {
    loaders: HashMap<String, Arc<dyn Loader>>,
}

impl LoaderRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Text (`txt`, `md`), PDF, and DOCX loaders.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        let text: Arc<dyn Loader> = Arc::new(TextLoader);
        registry.register_arc("txt", text.clone());
        registry.register_arc("md", text);
        registry.register("pdf", PdfLoader);
        registry.register("docx", DocxLoader);
        registry
    }

    pub fn register(&mut self, extension: &str, loader: impl Loader + 'static) {
        self.register_arc(extension, Arc::new(loader));
    }

    pub fn register_arc(&mut self, extension: &str, loader: Arc<dyn Loader>) {
        self.loaders
            .insert(extension.trim_start_matches('.').to_lowercase(), loader);
    }

    /// Loader for `path`'s extension, if any.
    pub fn get(&self, path: &Path) -> Option<Arc<dyn Loader>> {
        let ext = path.extension()?.to_string_lossy().to_lowercase();
        self.loaders.get(&ext).cloned()
    }

    pub fn supports(&self, path: &Path) -> bool {
        self.get(path).is_some()
    }

    /// Registered extensions, sorted.
    pub fn extensions(&self) -> Vec<String> {
        let mut exts: Vec<String> = self.loaders.keys().cloned().collect();
        exts.sort();
        exts
    }
}

/// Plain text. UTF-8, falling back to Windows-1252 for legacy files.
pub struct TextLoader;

impl Loader for TextLoader {
    fn load(&self, path: &Path) -> Result<Vec<String>> {
        let bytes = std::fs::read(path).map_err(|e| IngestError::load(path, e))?;
        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => {
                tracing::debug!(path = %path.display(), "not UTF-8, decoding as Windows-1252");
                let (decoded, _) = WINDOWS_1252.decode_without_bom_handling(e.as_bytes());
                decoded.into_owned()
            }
        };
        Ok(vec![text])
    }
}

pub struct PdfLoader;

impl Loader for PdfLoader {
    fn load(&self, path: &Path) -> Result<Vec<String>> {
        let bytes = std::fs::read(path).map_err(|e| IngestError::load(path, e))?;
        let text = pdf_extract::extract_text_from_mem(&bytes)
            .map_err(|e| IngestError::load(path, format!("PDF extraction failed: {}", e)))?;
        // pdf-extract separates pages with form feeds
        Ok(text
            .split('\x0c')
            .map(str::to_string)
            .filter(|page| !page.trim().is_empty())
            .collect())
    }
}

/// Word documents: one segment per paragraph of `word/document.xml`.
pub struct DocxLoader;

impl Loader for DocxLoader {
    fn load(&self, path: &Path) -> Result<Vec<String>> {
        let bytes = std::fs::read(path).map_err(|e| IngestError::load(path, e))?;
        let xml = read_document_xml(&bytes).map_err(|reason| IngestError::load(path, reason))?;
        docx_paragraphs(&xml).map_err(|reason| IngestError::load(path, reason))
    }
}

fn read_document_xml(bytes: &[u8]) -> std::result::Result<Vec<u8>, String> {
    let mut archive =
        zip::ZipArchive::new(std::io::Cursor::new(bytes)).map_err(|e| e.to_string())?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| "word/document.xml not found".to_string())?;
    let mut out = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut out)
        .map_err(|e| e.to_string())?;
    if out.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err("word/document.xml exceeds size limit".to_string());
    }
    Ok(out)
}

fn docx_paragraphs(xml: &[u8]) -> std::result::Result<Vec<String>, String> {
    use quick_xml::events::Event;

    let mut paragraphs = Vec::new();
    let mut current = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(te)) if in_text => {
                current.push_str(te.unescape().unwrap_or_default().as_ref());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    if !current.trim().is_empty() {
                        paragraphs.push(std::mem::take(&mut current));
                    }
                    current.clear();
                }
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"tab" => current.push('\t'),
            Ok(Event::Eof) => break,
            Err(e) => return Err(e.to_string()),
            _ => {}
        }
        buf.clear();
    }
    if !current.trim().is_empty() {
        paragraphs.push(current);
    }
    Ok(paragraphs)
}
