
use tracing::debug;

/// A bounded, overlapping segment of a source document's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    /// Index of this chunk within its source document
    pub index: usize,
}

/// Character-window chunking parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks
    pub overlap: usize,
}

impl ChunkingConfig {
    pub const DEFAULT_SIZE: usize = 512;
    pub const DEFAULT_OVERLAP: usize = 100;
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: Self::DEFAULT_SIZE,
            overlap: Self::DEFAULT_OVERLAP,
        }
    }
}

/// Split text into overlapping fixed-size chunks.
///
/// Every chunk is at most `chunk_size` characters, and consecutive chunks
/// share exactly `overlap` characters: the overlap-length suffix of chunk
/// `i` equals the overlap-length prefix of chunk `i + 1`. Counts are in
/// `char`s, so multi-byte text never splits inside a code point.
///
/// Requires `overlap < chunk_size` (enforced at config load); whitespace-only
/// input produces no chunks.
#[inline]
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Vec<Chunk> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let step = config.chunk_size.saturating_sub(config.overlap).max(1);

    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + config.chunk_size).min(chars.len());
        chunks.push(Chunk {
            text: chars[start..end].iter().collect(),
            index: chunks.len(),
        });

        if end == chars.len() {
            break;
        }
        start += step;
    }

    debug!(
        "Chunked {} chars into {} chunks (size {}, overlap {})",
        chars.len(),
        chunks.len(),
        config.chunk_size,
        config.overlap
    );

    chunks
}
