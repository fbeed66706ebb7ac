use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::{CorpusConfig, RagConfig};
use crate::error::{Error, Result, RowError};
use crate::splitter::RecursiveSplitter;
use crate::types::{Chunk, Document};

/// Where the ingestor reads documents from.
#[derive(Debug, Clone)]
pub enum CorpusSource {
    /// CSV (or JSON Lines by extension) with `content` and `url` columns.
    Table(PathBuf),
    /// Directory of `*.txt` files; the assembled table is optionally written
    /// to `export_to` as CSV.
    TextDir { dir: PathBuf, export_to: Option<PathBuf> },
    /// Documents already in memory.
    Documents(Vec<Document>),
}

/// Documents read from a source plus the rows that were skipped on the way.
#[derive(Debug, Clone, Default)]
pub struct CorpusLoad {
    pub documents: Vec<Document>,
    pub skipped: Vec<RowError>,
}

#[derive(Debug, Deserialize)]
struct CorpusRow {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

impl CorpusRow {
    fn into_document(self, row: usize) -> std::result::Result<Document, RowError> {
        let content = self.content.unwrap_or_default();
        if content.trim().is_empty() {
            return Err(RowError { row, reason: "missing or empty content".to_string() });
        }
        Ok(Document { content, source_url: self.url.unwrap_or_default().trim().to_string() })
    }
}

impl CorpusSource {
    /// Pick the configured source: the table file if present, else the raw
    /// text directory (exporting the table for later runs). `None` when
    /// neither exists.
    pub fn discover(table: &Path, raw_texts_dir: &Path) -> Option<Self> {
        if table.is_file() {
            return Some(Self::Table(table.to_path_buf()));
        }
        if raw_texts_dir.is_dir() {
            return Some(Self::TextDir { dir: raw_texts_dir.to_path_buf(), export_to: Some(table.to_path_buf()) });
        }
        None
    }

    pub fn load(&self, corpus: &CorpusConfig) -> Result<CorpusLoad> {
        match self {
            Self::Table(path) => load_table(path),
            Self::TextDir { dir, export_to } => {
                let load = load_text_dir(dir, corpus)?;
                if let Some(path) = export_to {
                    export_csv(&load.documents, path)?;
                    info!(path = %path.display(), documents = load.documents.len(), "Saved processed corpus");
                }
                Ok(load)
            }
            Self::Documents(docs) => Ok(CorpusLoad { documents: docs.clone(), skipped: Vec::new() }),
        }
    }
}

/// Load a CSV or JSON Lines corpus. Bad rows are skipped and reported.
pub fn load_table(path: &Path) -> Result<CorpusLoad> {
    let ext = path.extension().and_then(|s| s.to_str()).map(str::to_ascii_lowercase);
    let load = match ext.as_deref() {
        Some("jsonl") | Some("ndjson") => load_jsonl(path)?,
        _ => load_csv(path)?,
    };
    for skipped in &load.skipped {
        warn!(path = %path.display(), "Skipping corpus {}", skipped);
    }
    info!(path = %path.display(), documents = load.documents.len(), skipped = load.skipped.len(), "Loaded corpus");
    Ok(load)
}

fn load_csv(path: &Path) -> Result<CorpusLoad> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| Error::Corpus(format!("{}: {}", path.display(), e)))?;
    let mut load = CorpusLoad::default();
    for (i, record) in reader.deserialize::<CorpusRow>().enumerate() {
        let row = i + 1;
        match record {
            Ok(r) => match r.into_document(row) {
                Ok(doc) => load.documents.push(doc),
                Err(e) => load.skipped.push(e),
            },
            Err(e) => load.skipped.push(RowError { row, reason: e.to_string() }),
        }
    }
    Ok(load)
}

fn load_jsonl(path: &Path) -> Result<CorpusLoad> {
    let raw = fs::read_to_string(path).map_err(|e| Error::Corpus(format!("{}: {}", path.display(), e)))?;
    let mut load = CorpusLoad::default();
    for (i, line) in raw.lines().enumerate() {
        if line.trim().is_empty() { continue; }
        let row = i + 1;
        match serde_json::from_str::<CorpusRow>(line) {
            Ok(r) => match r.into_document(row) {
                Ok(doc) => load.documents.push(doc),
                Err(e) => load.skipped.push(e),
            },
            Err(e) => load.skipped.push(RowError { row, reason: e.to_string() }),
        }
    }
    Ok(load)
}

/// One document per `*.txt` file under `dir`, URL looked up by file name.
pub fn load_text_dir(dir: &Path, corpus: &CorpusConfig) -> Result<CorpusLoad> {
    let files = list_txt_files(dir);
    if files.is_empty() {
        return Err(Error::Corpus(format!("no .txt files found under {}", dir.display())));
    }
    let mut load = CorpusLoad::default();
    for (i, file_path) in files.iter().enumerate() {
        let row = i + 1;
        let content = match read_file_content(file_path) {
            Ok(c) => c.trim().to_string(),
            Err(e) => {
                warn!(path = %file_path.display(), error = %e, "Skipping unreadable text file");
                load.skipped.push(RowError { row, reason: format!("{}: {}", file_path.display(), e) });
                continue;
            }
        };
        if content.is_empty() {
            load.skipped.push(RowError { row, reason: format!("{} is empty", file_path.display()) });
            continue;
        }
        let file_name = file_path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        let url = corpus.url_map.get(&file_name).cloned().unwrap_or_else(|| corpus.default_url.clone());
        debug!(path = %file_path.display(), url = %url, "Processed text file");
        load.documents.push(Document { content, source_url: url });
    }
    Ok(load)
}

/// Write documents as a `content,url` CSV, creating parent directories.
pub fn export_csv(documents: &[Document], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::Corpus(format!("{}: {}", parent.display(), e)))?;
    }
    let to_err = |e: csv::Error| Error::Corpus(format!("{}: {}", path.display(), e));
    let mut writer = csv::Writer::from_path(path).map_err(to_err)?;
    writer.write_record(["content", "url"]).map_err(to_err)?;
    for doc in documents {
        writer.write_record([doc.content.as_str(), doc.source_url.as_str()]).map_err(to_err)?;
    }
    writer.flush().map_err(|e| Error::Corpus(format!("{}: {}", path.display(), e)))?;
    Ok(())
}

/// Stable content hash of a corpus, used to detect a stale index.
pub fn corpus_fingerprint(documents: &[Document]) -> String {
    let mut hasher = blake3::Hasher::new();
    for doc in documents {
        hasher.update(doc.content.as_bytes());
        hasher.update(&[0]);
        hasher.update(doc.source_url.as_bytes());
        hasher.update(&[0]);
    }
    hasher.finalize().to_hex().to_string()
}

fn read_file_content(file_path: &Path) -> std::io::Result<String> {
    match fs::read_to_string(file_path) {
        Ok(content) => Ok(content),
        Err(_) => Ok(String::from_utf8_lossy(&fs::read(file_path)?).to_string()),
    }
}

fn list_txt_files(root: &Path) -> Vec<PathBuf> {
    let mut txt_files = Vec::new();
    for entry in walkdir::WalkDir::new(root).into_iter().filter_map(|e| e.ok()).filter(|e| e.file_type().is_file()) {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some("txt") { txt_files.push(path.to_path_buf()); }
    }
    txt_files.sort();
    txt_files
}

/// Output of [`DataProcessor::process`].
#[derive(Debug, Clone, Default)]
pub struct ProcessedCorpus {
    pub chunks: Vec<Chunk>,
    pub documents: usize,
    pub short_documents: usize,
    pub short_chunks: usize,
}

/// Length filtering and chunking of loaded documents.
#[derive(Debug, Clone)]
pub struct DataProcessor {
    splitter: RecursiveSplitter,
    min_doc_length: usize,
    min_chunk_length: usize,
}

impl DataProcessor {
    pub fn new(rag: &RagConfig) -> Result<Self> {
        Ok(Self {
            splitter: RecursiveSplitter::new(rag.chunk_size, rag.chunk_overlap)?,
            min_doc_length: rag.min_doc_length,
            min_chunk_length: rag.min_chunk_length,
        })
    }

    /// Documents long enough to index, and how many were dropped.
    pub fn filter_documents(&self, documents: Vec<Document>) -> (Vec<Document>, usize) {
        let before = documents.len();
        let kept: Vec<Document> = documents.into_iter().filter(|d| d.len_chars() >= self.min_doc_length).collect();
        let dropped = before - kept.len();
        (kept, dropped)
    }

    /// Split one document; every chunk inherits the document's URL.
    pub fn chunk_document(&self, document: &Document) -> Vec<Chunk> {
        self.splitter
            .split(&document.content)
            .into_iter()
            .map(|text| Chunk { text, source_url: document.source_url.clone() })
            .collect()
    }

    /// Filter documents, split survivors, and drop short chunks.
    pub fn process(&self, documents: Vec<Document>) -> ProcessedCorpus {
        let (documents, short_documents) = self.filter_documents(documents);
        if short_documents > 0 {
            info!("Filtered out {} documents shorter than {} characters", short_documents, self.min_doc_length);
        }
        info!("Loaded {} documents", documents.len());

        let mut chunks = Vec::new();
        let mut short_chunks = 0usize;
        for document in &documents {
            for chunk in self.chunk_document(document) {
                if chunk.len_chars() >= self.min_chunk_length {
                    chunks.push(chunk);
                } else {
                    short_chunks += 1;
                }
            }
        }
        if short_chunks > 0 {
            info!("Filtered out {} chunks shorter than {} characters", short_chunks, self.min_chunk_length);
        }
        info!("Created {} valid chunks from documents", chunks.len());
        ProcessedCorpus { chunks, documents: documents.len(), short_documents, short_chunks }
    }
}
