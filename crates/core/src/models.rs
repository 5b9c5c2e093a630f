use crate::error::EmbeddingError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SearchMode {
    Vector,
    FullTextAny,
    FullTextAll,
    FullTextRank,
    Hybrid,
}

impl SearchMode {
    pub const ALL: [SearchMode; 5] = [
        SearchMode::Vector,
        SearchMode::FullTextAny,
        SearchMode::FullTextAll,
        SearchMode::FullTextRank,
        SearchMode::Hybrid,
    ];

    pub fn needs_embedding(self) -> bool {
        matches!(self, SearchMode::Vector | SearchMode::Hybrid)
    }

    pub fn needs_keywords(self) -> bool {
        !matches!(self, SearchMode::Vector)
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SearchMode::Vector => "vector",
            SearchMode::FullTextAny => "full-text-any",
            SearchMode::FullTextAll => "full-text-all",
            SearchMode::FullTextRank => "full-text-rank",
            SearchMode::Hybrid => "hybrid",
        };
        f.write_str(name)
    }
}

/// Which of the three provisioned containers a query runs against. They hold
/// the same documents and differ only in their vector/full-text indexing policy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum IndexSelection {
    #[default]
    NoIndex,
    QuantizedFlat,
    DiskAnn,
}

impl IndexSelection {
    pub const ALL: [IndexSelection; 3] = [
        IndexSelection::NoIndex,
        IndexSelection::QuantizedFlat,
        IndexSelection::DiskAnn,
    ];

    pub fn label(self) -> &'static str {
        match self {
            IndexSelection::NoIndex => "No Index",
            IndexSelection::QuantizedFlat => "QFLAT & Full Text Search Index",
            IndexSelection::DiskAnn => "DiskANN & Full Text Search Index",
        }
    }
}

impl fmt::Display for IndexSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SearchRequest {
    pub mode: SearchMode,
    pub text: String,
    pub index: IndexSelection,
}

impl SearchRequest {
    pub fn new(mode: SearchMode, text: impl Into<String>, index: IndexSelection) -> Self {
        Self {
            mode,
            text: text.into(),
            index,
        }
    }
}

/// Query embedding produced once per request. Every component is finite so the
/// vector can always be rendered as a numeric literal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbeddingVector(Vec<f32>);

impl EmbeddingVector {
    pub fn new(values: Vec<f32>) -> Result<Self, EmbeddingError> {
        if values.is_empty() {
            return Err(EmbeddingError::Empty);
        }
        if let Some(index) = values.iter().position(|value| !value.is_finite()) {
            return Err(EmbeddingError::NonFinite { index });
        }
        Ok(Self(values))
    }

    pub fn values(&self) -> &[f32] {
        &self.0
    }

    pub fn dimensions(&self) -> usize {
        self.0.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PaperRow {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, rename = "abstract")]
    pub abstract_text: String,
    #[serde(
        default,
        rename = "SimilarityScore",
        skip_serializing_if = "Option::is_none"
    )]
    pub similarity_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    /// Query text as executed, with vector literals redacted.
    pub executed_query: String,
    pub mode: SearchMode,
    pub index: IndexSelection,
    pub rows: Vec<PaperRow>,
    pub embedding_time: Option<Duration>,
    pub query_time: Duration,
    pub request_charge: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn embedding_vector_rejects_non_finite_values() {
        let error = EmbeddingVector::new(vec![0.1, f32::NAN, 0.3]).unwrap_err();
        assert!(matches!(error, EmbeddingError::NonFinite { index: 1 }));
        assert!(matches!(
            EmbeddingVector::new(Vec::new()),
            Err(EmbeddingError::Empty)
        ));
    }

    #[test]
    fn only_vector_and_hybrid_need_embeddings() {
        let embedding_modes: Vec<_> = SearchMode::ALL
            .into_iter()
            .filter(|mode| mode.needs_embedding())
            .collect();
        assert_eq!(embedding_modes, vec![SearchMode::Vector, SearchMode::Hybrid]);
        assert!(SearchMode::Hybrid.needs_keywords());
        assert!(!SearchMode::Vector.needs_keywords());
    }

    #[test]
    fn paper_row_reads_store_document_shape() -> Result<(), serde_json::Error> {
        let row: PaperRow = serde_json::from_value(json!({
            "id": "2401.00001",
            "title": "A Cantorian fractal spacetime",
            "abstract": "We model spacetime as a transfinite set.",
            "SimilarityScore": 0.87
        }))?;
        assert_eq!(row.abstract_text, "We model spacetime as a transfinite set.");
        assert_eq!(row.similarity_score, Some(0.87));

        let sparse: PaperRow = serde_json::from_value(json!({ "id": "x" }))?;
        assert_eq!(sparse.title, "");
        assert_eq!(sparse.similarity_score, None);
        Ok(())
    }
}
