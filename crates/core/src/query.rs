//! Query construction for the four search shapes.
//!
//! Every query is rendered twice from the same template: once with the real
//! embedding literal for execution, and once with [`REDACTION_MARKER`] in its
//! place for display and logging. The two texts differ only at the vector
//! literal positions.

use crate::error::SearchError;
use crate::models::{EmbeddingVector, SearchMode};
use serde_json::Value;

/// Rows requested by every query shape.
pub const TOP_N: usize = 10;

pub const REDACTION_MARKER: &str = "REDACTED";

const ALIAS: &str = "l";
const VECTOR_FIELD: &str = "embedding";
const TEXT_FIELD: &str = "abstract";
const SCORE_ALIAS: &str = "SimilarityScore";

/// Whitespace-separated search terms. Case and punctuation are kept as typed,
/// so `holes,` and `holes` are distinct keywords.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keywords(Vec<String>);

impl Keywords {
    pub fn tokenize(text: &str) -> Self {
        Self(text.split_whitespace().map(str::to_string).collect())
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Space-joined keywords, as they would be typed back into the search box.
    pub fn joined(&self) -> String {
        self.0.join(" ")
    }

    /// `"k1", "k2"` with each keyword rendered as an escaped string literal.
    fn literal_list(&self) -> String {
        self.0
            .iter()
            .map(|keyword| Value::String(keyword.clone()).to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Containment {
    All,
    Any,
}

impl Containment {
    fn function_name(self) -> &'static str {
        match self {
            Containment::All => "FullTextContainsAll",
            Containment::Any => "FullTextContainsAny",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryShape<'a> {
    Vector {
        embedding: &'a EmbeddingVector,
    },
    FullText {
        keywords: Keywords,
        containment: Containment,
    },
    FullTextRank {
        keywords: Keywords,
    },
    Hybrid {
        embedding: &'a EmbeddingVector,
        keywords: Keywords,
    },
}

impl<'a> QueryShape<'a> {
    /// Picks the shape for `mode`. Vector and hybrid shapes require the
    /// request's embedding; keyword shapes require at least one keyword.
    pub fn for_mode(
        mode: SearchMode,
        text: &str,
        embedding: Option<&'a EmbeddingVector>,
    ) -> Result<Self, SearchError> {
        let keywords = Keywords::tokenize(text);
        if mode.needs_keywords() && keywords.is_empty() {
            return Err(SearchError::Input(format!(
                "{mode} search needs at least one keyword"
            )));
        }

        let require_embedding = || {
            embedding.ok_or_else(|| {
                SearchError::Input(format!("{mode} search needs a query embedding"))
            })
        };

        let shape = match mode {
            SearchMode::Vector => QueryShape::Vector {
                embedding: require_embedding()?,
            },
            SearchMode::FullTextAll => QueryShape::FullText {
                keywords,
                containment: Containment::All,
            },
            SearchMode::FullTextAny => QueryShape::FullText {
                keywords,
                containment: Containment::Any,
            },
            SearchMode::FullTextRank => QueryShape::FullTextRank { keywords },
            SearchMode::Hybrid => QueryShape::Hybrid {
                embedding: require_embedding()?,
                keywords,
            },
        };

        Ok(shape)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltQuery {
    pub query_text: String,
    pub display_text: String,
}

pub fn build_query(shape: &QueryShape<'_>) -> BuiltQuery {
    BuiltQuery {
        query_text: render(shape, VectorRendering::Literal),
        display_text: render(shape, VectorRendering::Redacted),
    }
}

#[derive(Clone, Copy)]
enum VectorRendering {
    Literal,
    Redacted,
}

fn render(shape: &QueryShape<'_>, rendering: VectorRendering) -> String {
    let projection = format!("SELECT TOP {TOP_N} {ALIAS}.id, {ALIAS}.title, {ALIAS}.abstract");

    match shape {
        QueryShape::Vector { embedding } => {
            let distance = vector_distance(embedding, rendering);
            format!("{projection}, {distance} AS {SCORE_ALIAS} FROM {ALIAS} ORDER BY {distance}")
        }
        QueryShape::FullText {
            keywords,
            containment,
        } => format!(
            "{projection} FROM {ALIAS} WHERE {}({ALIAS}.{TEXT_FIELD}, {})",
            containment.function_name(),
            keywords.literal_list()
        ),
        QueryShape::FullTextRank { keywords } => format!(
            "{projection} FROM {ALIAS} ORDER BY RANK {}",
            full_text_score(keywords)
        ),
        QueryShape::Hybrid {
            embedding,
            keywords,
        } => format!(
            "{projection} FROM {ALIAS} ORDER BY RANK RRF({}, {})",
            vector_distance(embedding, rendering),
            full_text_score(keywords)
        ),
    }
}

fn vector_distance(embedding: &EmbeddingVector, rendering: VectorRendering) -> String {
    let literal = match rendering {
        VectorRendering::Literal => vector_literal(embedding),
        VectorRendering::Redacted => REDACTION_MARKER.to_string(),
    };
    format!("VectorDistance({ALIAS}.{VECTOR_FIELD}, {literal})")
}

fn full_text_score(keywords: &Keywords) -> String {
    format!(
        "FullTextScore({ALIAS}.{TEXT_FIELD}, [{}])",
        keywords.literal_list()
    )
}

/// `[v0, v1, ...]` using the shortest round-trip decimal form of each value.
fn vector_literal(embedding: &EmbeddingVector) -> String {
    let values = embedding
        .values()
        .iter()
        .map(f32::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    format!("[{values}]")
}
