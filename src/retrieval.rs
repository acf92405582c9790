//! Semantic search and extractive answers over indexed chunks.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::Arc;

use crate::config::SearchConfig;
use crate::documents::{DocumentId, Principal};
use crate::error::GatewayResult;
use crate::vector::{DocumentSource, SearchFilter, VectorGateway};

/// Answer text used when nothing accessible matches.
pub const NO_RESULTS_ANSWER: &str = "No relevant documents found for your query.";

/// Number of contexts quoted in an answer.
const ANSWER_CONTEXTS: usize = 3;

/// One chunk returned by semantic search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub document_id: DocumentId,
    pub filename: String,
    pub chunk_content: String,
    /// Cosine similarity to the query
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagAnswer {
    pub answer: String,
    pub sources: Vec<SearchHit>,
}

/// Nearest-neighbour search restricted to what a principal may read.
pub struct Retriever {
    gateway: Arc<dyn VectorGateway>,
    source: Arc<dyn DocumentSource>,
    config: SearchConfig,
}

impl Retriever {
    pub fn new(
        gateway: Arc<dyn VectorGateway>,
        source: Arc<dyn DocumentSource>,
        config: SearchConfig,
    ) -> Self {
        Self {
            gateway,
            source,
            config,
        }
    }

    /// The `top_k` chunks most similar to `query`, best first.
    ///
    /// Only documents accessible to `principal` are searched. An extra
    /// `filter` narrows the search further.
    pub fn semantic_search(
        &self,
        principal: &Principal,
        query: &str,
        top_k: usize,
        filter: Option<SearchFilter>,
    ) -> GatewayResult<Vec<SearchHit>> {
        let accessible: Vec<DocumentId> = self
            .source
            .list_accessible_documents(principal)?
            .into_iter()
            .map(|doc| doc.document_id)
            .collect();

        let mut filter = filter.unwrap_or_default();
        filter.document_ids = Some(match filter.document_ids.take() {
            Some(requested) => requested
                .into_iter()
                .filter(|id| accessible.contains(id))
                .collect(),
            None => accessible,
        });
        if filter.document_ids.as_ref().is_some_and(Vec::is_empty) || top_k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self.gateway.embed(query)?;
        let hits: Vec<SearchHit> = self
            .gateway
            .nearest_neighbors(&query_vector, top_k, Some(&filter))?
            .into_iter()
            .map(|neighbor| SearchHit {
                document_id: neighbor.payload.document_id,
                filename: neighbor.payload.filename,
                chunk_content: neighbor.payload.document,
                score: neighbor.score.get(),
            })
            .collect();

        tracing::debug!(target: "retrieval", "query '{query}' matched {} chunks", hits.len());
        Ok(hits)
    }

    /// Retrieve context for `query` and assemble an extractive answer.
    pub fn rag(&self, principal: &Principal, query: &str) -> GatewayResult<RagAnswer> {
        let sources = self.semantic_search(principal, query, self.config.rag_top_k, None)?;
        let answer = compose_answer(query, &sources, self.config.rag_context_chars);
        Ok(RagAnswer { answer, sources })
    }
}

/// Quote the first few contexts under a short header.
pub fn compose_answer(query: &str, sources: &[SearchHit], context_chars: usize) -> String {
    if sources.is_empty() {
        return NO_RESULTS_ANSWER.to_string();
    }

    let mut answer = format!("Based on the retrieved documents:\n\nQuery: {query}\n\nRelevant information:\n");
    for (i, hit) in sources.iter().take(ANSWER_CONTEXTS).enumerate() {
        let excerpt: String = hit.chunk_content.chars().take(context_chars).collect();
        let _ = write!(answer, "{}. {excerpt}...\n\n", i + 1);
    }
    answer.push_str(
        "\nNote: For full RAG capabilities with LLM-generated answers, integrate with OpenAI GPT or similar models.",
    );
    answer
}
