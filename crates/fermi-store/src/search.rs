//! In-memory retrieval backends
//!
//! `InMemorySearchIndex` embeds every document once at insertion and scores
//! queries by brute-force cosine similarity. Corpora for estimation (curated
//! facts, benchmarks) are small enough that a linear scan is fast.

use crate::embedding::{cosine_similarity, EmbeddingModel, HashedEmbeddingModel};
use crate::StoreError;
use fermi_domain::traits::{Document, ScoredDocument, SearchBackend, SearchFilters};
use std::sync::{PoisonError, RwLock};

struct IndexedDocument {
    document: Document,
    embedding: Vec<f32>,
}

/// Cosine-similarity search over documents held in memory
///
/// # Examples
///
/// ```
/// use fermi_domain::traits::{Document, SearchBackend, SearchFilters};
/// use fermi_store::InMemorySearchIndex;
///
/// let index = InMemorySearchIndex::new();
/// index
///     .add_document(
///         Document::new("kr-pop", "South Korea population")
///             .in_collection("definite_facts")
///             .answering("South Korea population", 51_000_000.0),
///     )
///     .unwrap();
///
/// let filters = SearchFilters::collection("definite_facts");
/// let hits = index.search("south korea population", 3, Some(&filters)).unwrap();
/// assert_eq!(hits[0].document.id, "kr-pop");
/// assert!(hits[0].score > 0.99);
/// ```
pub struct InMemorySearchIndex<E = HashedEmbeddingModel> {
    model: E,
    documents: RwLock<Vec<IndexedDocument>>,
}

impl InMemorySearchIndex<HashedEmbeddingModel> {
    /// Index using the default hashed embedding
    pub fn new() -> Self {
        Self::with_model(HashedEmbeddingModel::default())
    }
}

impl Default for InMemorySearchIndex<HashedEmbeddingModel> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: EmbeddingModel> InMemorySearchIndex<E> {
    /// Index using a specific embedding model
    pub fn with_model(model: E) -> Self {
        Self {
            model,
            documents: RwLock::new(Vec::new()),
        }
    }

    /// Embed and add a document
    ///
    /// The question is embedded when present, otherwise the content.
    /// A document with an existing id replaces the old one.
    pub fn add_document(&self, document: Document) -> Result<(), StoreError> {
        let text = document.question.as_deref().unwrap_or(&document.content);
        let embedding = self
            .model
            .embed(text)
            .map_err(|e| StoreError::InvalidData(format!("document {}: {}", document.id, e)))?;

        let mut documents = self.documents.write().unwrap_or_else(PoisonError::into_inner);
        documents.retain(|d| d.document.id != document.id);
        documents.push(IndexedDocument { document, embedding });
        Ok(())
    }

    /// Add several documents, stopping at the first failure
    pub fn add_documents(
        &self,
        documents: impl IntoIterator<Item = Document>,
    ) -> Result<(), StoreError> {
        for document in documents {
            self.add_document(document)?;
        }
        Ok(())
    }

    /// Number of indexed documents
    pub fn len(&self) -> usize {
        self.documents.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether the index is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<E: EmbeddingModel> SearchBackend for InMemorySearchIndex<E> {
    type Error = StoreError;

    fn search(
        &self,
        query: &str,
        top_k: usize,
        filters: Option<&SearchFilters>,
    ) -> Result<Vec<ScoredDocument>, Self::Error> {
        if top_k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let query_embedding = self
            .model
            .embed(query)
            .map_err(|e| StoreError::Search(e.to_string()))?;

        let documents = self.documents.read().unwrap_or_else(PoisonError::into_inner);
        let mut hits: Vec<ScoredDocument> = documents
            .iter()
            .filter(|d| filters.map_or(true, |f| f.matches(&d.document)))
            .map(|d| ScoredDocument {
                document: d.document.clone(),
                score: f64::from(cosine_similarity(&query_embedding, &d.embedding)),
            })
            .filter(|hit| hit.score > 0.0)
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_k);
        Ok(hits)
    }
}

/// Backend that never finds anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSearchBackend;

impl SearchBackend for NullSearchBackend {
    type Error = StoreError;

    fn search(
        &self,
        _query: &str,
        _top_k: usize,
        _filters: Option<&SearchFilters>,
    ) -> Result<Vec<ScoredDocument>, Self::Error> {
        Ok(Vec::new())
    }
}
