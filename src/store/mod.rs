// Vector store module
// Persists embedded chunks in LanceDB and serves nearest-neighbor search

pub mod vector_store;

use std::fmt;
use std::str::FromStr;

use lancedb::DistanceType;
use serde::{Deserialize, Serialize};

pub use vector_store::{ScoredRecord, VectorStore};

/// A persisted unit in the collection: an embedding vector plus the chunk
/// text it represents, with provenance for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkRecord {
    /// Unique identifier for this record
    pub id: String,
    /// The embedding vector (1536 dimensions for text-embedding-3-small)
    pub vector: Vec<f32>,
    /// The chunk text this vector was computed from
    pub text: String,
    /// URL of the source page
    pub source_url: String,
    /// Index of this chunk within the source page
    pub chunk_index: u32,
    /// RFC 3339 timestamp when this record was created
    pub created_at: String,
}

/// Similarity metric declared at collection creation and applied on every
/// search. Must match the metric the collection was created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    #[default]
    Dot,
    Cosine,
    Euclidean,
}

impl SimilarityMetric {
    pub(crate) fn distance_type(self) -> DistanceType {
        match self {
            Self::Dot => DistanceType::Dot,
            Self::Cosine => DistanceType::Cosine,
            Self::Euclidean => DistanceType::L2,
        }
    }
}

impl fmt::Display for SimilarityMetric {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dot => write!(f, "dot_product"),
            Self::Cosine => write!(f, "cosine"),
            Self::Euclidean => write!(f, "euclidean"),
        }
    }
}

impl FromStr for SimilarityMetric {
    type Err = String;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dot" | "dot_product" => Ok(Self::Dot),
            "cosine" => Ok(Self::Cosine),
            "euclidean" | "l2" => Ok(Self::Euclidean),
            other => Err(format!(
                "unknown similarity metric '{}' (expected dot_product, cosine, or euclidean)",
                other
            )),
        }
    }
}
