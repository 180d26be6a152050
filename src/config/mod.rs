mod client_config;

pub use client_config::{
    ACTIVATION_TREE_ENDPOINT, ClientConfig, ConfigError, DIFF_ENDPOINT, FormParams,
    PAGE_VERSION_ENDPOINT, REFERER_PATH, REPLICATION_ENDPOINT, TOKEN_ENDPOINT,
};
