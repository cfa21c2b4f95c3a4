// PDF ingestion: page extraction, character-window chunking, batched
// embed-and-upsert.

#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};

use lopdf::Document;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{ChunkingConfig, Config};
use crate::openai::OpenAiClient;
use crate::pinecone::{ChunkMetadata, IndexHandle, PineconeClient, VectorRecord};
use crate::{RagError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentPage {
    pub source: String,
    pub page: u32,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChunk {
    pub text: String,
    pub source: String,
    pub page: u32,
    pub chunk_index: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestStats {
    pub documents: usize,
    pub pages: usize,
    pub chunks: usize,
    pub upserted: usize,
    pub vectors_before: u64,
    pub vectors_after: u64,
}

/// Split text into fixed-size character windows with overlap.
///
/// Windows advance by `chunk_size - chunk_overlap` characters, so a text of
/// `L` characters yields `ceil((L - O) / (C - O))` chunks, and any text of at
/// most `chunk_size` characters yields exactly one. Empty text yields none.
/// Boundaries are computed in characters, never splitting a UTF-8 code point.
#[inline]
pub fn chunk_text(text: &str, chunking: &ChunkingConfig) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    // Byte offset of every char boundary, plus the end of the text.
    let mut boundaries: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    boundaries.push(text.len());

    let char_count = boundaries.len() - 1;
    // Config validation guarantees overlap < size; guard anyway so a bad
    // caller cannot spin forever.
    let step = chunking
        .chunk_size
        .saturating_sub(chunking.chunk_overlap)
        .max(1);

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < char_count {
        let end = (start + chunking.chunk_size).min(char_count);
        chunks.push(text[boundaries[start]..boundaries[end]].to_string());
        if end == char_count {
            break;
        }
        start += step;
    }

    chunks
}

/// Chunk a single page, tagging each chunk with its source and page number.
#[inline]
pub fn chunk_page(page: &DocumentPage, chunking: &ChunkingConfig) -> Vec<DocumentChunk> {
    chunk_text(&page.text, chunking)
        .into_iter()
        .enumerate()
        .map(|(chunk_index, text)| DocumentChunk {
            text,
            source: page.source.clone(),
            page: page.page,
            chunk_index,
        })
        .collect()
}

/// Extract text from every page of a PDF. A page that fails text extraction
/// is logged and yields no text; a document that fails to load is fatal.
#[inline]
pub fn load_pdf(path: &Path) -> Result<Vec<DocumentPage>> {
    let source = path
        .file_name()
        .map_or_else(
            || path.display().to_string(),
            |n| n.to_string_lossy().into_owned(),
        );

    let document = Document::load(path)
        .map_err(|e| RagError::Ingest(format!("Failed to load {source}: {e}")))?;

    let mut pages = Vec::new();
    for (page_number, _) in document.get_pages() {
        let text = match document.extract_text(&[page_number]) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to extract text from {source} page {page_number}: {e}");
                String::new()
            }
        };
        pages.push(DocumentPage {
            source: source.clone(),
            page: page_number,
            text,
        });
    }

    debug!("Loaded {} pages from {}", pages.len(), source);
    Ok(pages)
}

/// Collect the PDF files in a directory, sorted by name. The directory must
/// exist and contain at least one PDF; this is checked before any network
/// call is made.
#[inline]
pub fn collect_pdfs(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(RagError::Ingest(format!(
            "Document directory not found: {}",
            dir.display()
        )));
    }

    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
        })
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(RagError::Ingest(format!(
            "No PDF files found in {}",
            dir.display()
        )));
    }

    Ok(files)
}

/// End-to-end ingestion: load PDFs, chunk pages, embed chunks, upsert into
/// the index in batches. At-least-once: a failure aborts the run without
/// rolling back batches already committed.
#[derive(Debug)]
pub struct IngestPipeline {
    openai: OpenAiClient,
    pinecone: PineconeClient,
    config: Config,
}

impl IngestPipeline {
    #[inline]
    pub fn new(config: &Config) -> Self {
        Self {
            openai: OpenAiClient::new(&config.openai),
            pinecone: PineconeClient::new(&config.pinecone),
            config: config.clone(),
        }
    }

    #[inline]
    pub fn from_parts(openai: OpenAiClient, pinecone: PineconeClient, config: Config) -> Self {
        Self {
            openai,
            pinecone,
            config,
        }
    }

    #[inline]
    pub fn run(&self, dir: &Path) -> Result<IngestStats> {
        let files = collect_pdfs(dir)?;
        info!("Ingesting {} PDF files from {}", files.len(), dir.display());

        let handle = self
            .pinecone
            .ensure_index(&self.config.pinecone, self.config.openai.embedding_dimension)?;

        let mut stats = IngestStats {
            documents: files.len(),
            vectors_before: handle.stats()?.total_vector_count,
            ..IngestStats::default()
        };
        info!("Index holds {} vectors before ingestion", stats.vectors_before);

        let mut chunks = Vec::new();
        for file in &files {
            let pages = load_pdf(file)?;
            stats.pages += pages.len();
            for page in &pages {
                chunks.extend(chunk_page(page, &self.config.chunking));
            }
        }
        stats.chunks = chunks.len();
        info!(
            "Split {} pages into {} chunks",
            stats.pages, stats.chunks
        );

        for batch in chunks.chunks(self.config.pinecone.upsert_batch_size) {
            stats.upserted += self.embed_and_upsert(&handle, batch)?;
        }

        stats.vectors_after = handle.stats()?.total_vector_count;
        info!(
            "Ingestion complete: {} vectors upserted, index now holds {}",
            stats.upserted, stats.vectors_after
        );

        Ok(stats)
    }

    fn embed_and_upsert(&self, handle: &IndexHandle, batch: &[DocumentChunk]) -> Result<usize> {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.openai.embed_batch(&texts)?;

        let vectors: Vec<VectorRecord> = batch
            .iter()
            .zip(embeddings)
            .map(|(chunk, values)| VectorRecord {
                id: Uuid::new_v4().to_string(),
                values,
                metadata: ChunkMetadata {
                    text: chunk.text.clone(),
                    source: chunk.source.clone(),
                    page: chunk.page,
                },
            })
            .collect();

        let upserted = handle.upsert(&vectors)?;
        debug!("Upserted batch of {} vectors", upserted);
        Ok(upserted)
    }
}
