
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;
use url::Url;

use crate::chunking::ChunkingConfig;
use crate::store::SimilarityMetric;

/// Output dimension of the embedding model. Ingestion and query embeddings
/// must both use this dimension or search results are meaningless, so it is
/// fixed here rather than configurable per call site.
pub const EMBEDDING_DIMENSION: usize = 1536;

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
const DEFAULT_CHAT_MODEL: &str = "gpt-4";
const DEFAULT_COLLECTION: &str = "f1_chunks";
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

/// Source pages ingested by default. Same corpus as the reference data set:
/// Wikipedia, formula1.com, Sky Sports, Red Bull.
const DEFAULT_SOURCE_URLS: &[&str] = &[
    "https://en.wikipedia.org/wiki/Formula_One",
    "https://www.skysports.com/f1",
    "https://www.formula1.com/en/latest/all",
    "https://www.formula1.com/en/latest/article/the-beginners-guide-to-the-formula-1-weekend.5RFZzGXNhEi9AEuMXwo987",
    "https://www.redbull.com/ie-en/f1-24-tips-guide",
    "https://www.formula1.com/en/racing/2023",
    "https://www.formula1.com/en/racing/2023/United_States.html",
    "https://www.formula1.com/en/racing/2022",
];

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub openai: OpenAiConfig,
    pub store: StoreConfig,
    pub chunking: ChunkingConfig,
    pub server: ServerConfig,
    pub source_urls: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: Url,
    pub embedding_model: String,
    pub chat_model: String,
    pub embedding_dimension: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    pub collection: String,
    pub metric: SimilarityMetric,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("{0} must not be empty")]
    EmptyValue(&'static str),
    #[error("Invalid URL in {var}: {value}")]
    InvalidUrl { var: &'static str, value: String },
    #[error("Invalid number in {var}: {value}")]
    InvalidNumber { var: &'static str, value: String },
    #[error("Invalid similarity metric: {0}")]
    InvalidMetric(String),
    #[error("Invalid bind address: {0}")]
    InvalidBindAddr(String),
    #[error("Chunk size must be greater than zero")]
    ZeroChunkSize,
    #[error("Chunk overlap ({overlap}) must be smaller than chunk size ({size})")]
    OverlapTooLarge { size: usize, overlap: usize },
    #[error("Could not determine a data directory; set PITWALL_DATA_DIR")]
    NoDataDir,
}

impl Config {
    /// Load configuration from the process environment, failing fast on any
    /// missing or invalid value.
    #[inline]
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup. The environment is
    /// one such lookup; tests substitute a map.
    #[inline]
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("OPENAI_API_KEY").ok_or(ConfigError::MissingVar("OPENAI_API_KEY"))?;
        if api_key.trim().is_empty() {
            return Err(ConfigError::EmptyValue("OPENAI_API_KEY"));
        }

        let base_url_str =
            lookup("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string());
        let base_url = Url::parse(&base_url_str).map_err(|_| ConfigError::InvalidUrl {
            var: "OPENAI_BASE_URL",
            value: base_url_str,
        })?;

        let openai = OpenAiConfig {
            api_key,
            base_url,
            embedding_model: lookup("PITWALL_EMBEDDING_MODEL")
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            chat_model: lookup("PITWALL_CHAT_MODEL")
                .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            embedding_dimension: EMBEDDING_DIMENSION,
        };

        let data_dir = match lookup("PITWALL_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::data_dir()
                .ok_or(ConfigError::NoDataDir)?
                .join("pitwall"),
        };

        let metric = match lookup("PITWALL_METRIC") {
            Some(value) => value
                .parse::<SimilarityMetric>()
                .map_err(|_| ConfigError::InvalidMetric(value))?,
            None => SimilarityMetric::default(),
        };

        let store = StoreConfig {
            data_dir,
            collection: lookup("PITWALL_COLLECTION")
                .unwrap_or_else(|| DEFAULT_COLLECTION.to_string()),
            metric,
        };

        let chunking = ChunkingConfig {
            chunk_size: parse_usize(&lookup, "PITWALL_CHUNK_SIZE", ChunkingConfig::DEFAULT_SIZE)?,
            overlap: parse_usize(
                &lookup,
                "PITWALL_CHUNK_OVERLAP",
                ChunkingConfig::DEFAULT_OVERLAP,
            )?,
        };
        if chunking.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if chunking.overlap >= chunking.chunk_size {
            return Err(ConfigError::OverlapTooLarge {
                size: chunking.chunk_size,
                overlap: chunking.overlap,
            });
        }

        let bind_addr_str = lookup("PITWALL_BIND_ADDR").unwrap_or_else(|| {
            DEFAULT_BIND_ADDR.to_string()
        });
        let bind_addr = bind_addr_str
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidBindAddr(bind_addr_str))?;

        let source_urls: Vec<String> = match lookup("PITWALL_SOURCE_URLS") {
            Some(value) => value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
                .collect(),
            None => DEFAULT_SOURCE_URLS.iter().map(ToString::to_string).collect(),
        };
        if source_urls.is_empty() {
            return Err(ConfigError::EmptyValue("PITWALL_SOURCE_URLS"));
        }

        Ok(Self {
            openai,
            store,
            chunking,
            server: ServerConfig { bind_addr },
            source_urls,
        })
    }
}

fn parse_usize<F>(lookup: &F, var: &'static str, default: usize) -> Result<usize, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        Some(value) => value
            .trim()
            .parse::<usize>()
            .map_err(|_| ConfigError::InvalidNumber { var, value }),
        None => Ok(default),
    }
}
