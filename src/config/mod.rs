pub mod settings;

pub use settings::{
    Config, ConfigError, OpenAiConfig, ServerConfig, StoreConfig, EMBEDDING_DIMENSION,
};
