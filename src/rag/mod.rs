// Retrieval-augmented answering: similarity search, context assembly,
// prompt construction, chat completion.


use tracing::{debug, info};

use crate::Result;
use crate::config::{Config, RetrievalConfig};
use crate::openai::OpenAiClient;
use crate::pinecone::{IndexHandle, PineconeClient, ScoredMatch};

/// Returned as a normal answer when retrieval finds nothing, even after the
/// broadened retry.
pub const NOT_FOUND_MESSAGE: &str = "I couldn't find relevant information in the knowledge base. Could you try rephrasing your question or asking about a different topic?";

/// Shorten a query to its first three whitespace-separated tokens for the
/// single broadened retry.
#[inline]
pub fn broaden_query(query: &str) -> String {
    query
        .split_whitespace()
        .take(3)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Format the top matches into a source-labeled context block. Matches are
/// assumed sorted by descending score; at most `max_chunks` are used and
/// matches without metadata are skipped.
#[inline]
pub fn assemble_context(matches: &[ScoredMatch], max_chunks: usize) -> String {
    matches
        .iter()
        .filter_map(|m| m.metadata.as_ref())
        .take(max_chunks)
        .enumerate()
        .map(|(i, metadata)| {
            format!(
                "[Source {}: {}, Page {}]\n{}",
                i + 1,
                metadata.source,
                metadata.page,
                metadata.text.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Instruction template constraining the model to the provided context and
/// to plain-text output.
#[inline]
pub fn build_prompt(context: &str, question: &str) -> String {
    format!(
        "You are an expert assistant with access to educational documents. \
         Answer the question using ONLY the provided context. Be specific, accurate, and helpful.\n\
         \n\
         IMPORTANT: Respond in plain text only - no markdown, asterisks, or special formatting.\n\
         \n\
         Context from documents:\n\
         {context}\n\
         \n\
         Question: {question}\n\
         \n\
         Answer based on the context above:"
    )
}

/// The query pipeline, bound to one index namespace.
#[derive(Debug)]
pub struct RagEngine {
    openai: OpenAiClient,
    index: IndexHandle,
    retrieval: RetrievalConfig,
}

impl RagEngine {
    /// Connect to the configured index. Fails if the index does not exist or
    /// is not ready; the query path never creates indexes.
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let index = PineconeClient::new(&config.pinecone).open_index(&config.pinecone)?;
        Ok(Self {
            openai: OpenAiClient::new(&config.openai),
            index,
            retrieval: config.retrieval.clone(),
        })
    }

    #[inline]
    pub fn from_parts(openai: OpenAiClient, index: IndexHandle, retrieval: RetrievalConfig) -> Self {
        Self {
            openai,
            index,
            retrieval,
        }
    }

    /// Search for chunks relevant to the query. An empty first pass triggers
    /// exactly one broadened retry with a lower K; the result may still be
    /// empty.
    #[inline]
    pub fn retrieve(&self, query: &str) -> Result<Vec<ScoredMatch>> {
        let vector = self.openai.embed(query)?;
        let matches = self.index.query(&vector, self.retrieval.top_k)?;
        debug!("Similarity search returned {} matches", matches.len());
        if !matches.is_empty() {
            return Ok(matches);
        }

        let broadened = broaden_query(query);
        if broadened.is_empty() {
            return Ok(Vec::new());
        }

        info!("No matches; retrying with broadened query: {broadened}");
        let vector = self.openai.embed(&broadened)?;
        let matches = self.index.query(&vector, self.retrieval.fallback_top_k)?;
        debug!("Broadened search returned {} matches", matches.len());
        Ok(matches)
    }

    /// Answer a question from retrieved context. Zero matches produce the
    /// not-found message as a normal answer, with no inference call.
    #[inline]
    pub fn answer(&self, query: &str) -> Result<String> {
        let matches = self.retrieve(query)?;
        if matches.is_empty() {
            return Ok(NOT_FOUND_MESSAGE.to_string());
        }

        let context = assemble_context(&matches, self.retrieval.context_chunks);
        let prompt = build_prompt(&context, query);
        self.openai.chat(&prompt)
    }
}
