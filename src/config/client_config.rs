use std::borrow::Cow;
use std::path::{Path, PathBuf};

use compio::fs;
use hashlink::LinkedHashMap;
use saphyr::{LoadableYamlNode, Scalar, Yaml};
use snafu::prelude::*;
use tracing::{debug, warn};

use crate::ext::AsyncTryFrom;

pub const DIFF_ENDPOINT: &str = "/crx/server/crx.default/jcr%3aroot";
pub const TOKEN_ENDPOINT: &str = "/libs/granite/csrf/token.json";
pub const REFERER_PATH: &str = "/crx/de/index.jsp";
pub const ACTIVATION_TREE_ENDPOINT: &str = "/etc/replication/treeactivation.html";
pub const REPLICATION_ENDPOINT: &str = "/crx/de/replication.jsp";
pub const PAGE_VERSION_ENDPOINT: &str = "/bin/wcmcommand";

/// Extra form fields merged into replication requests, in insertion order.
pub type FormParams = LinkedHashMap<String, String>;

/// Endpoint layout and request options of one repository instance.
///
/// All endpoints are paths relative to the instance URL given to the client.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub diff_endpoint: String,
    pub token_endpoint: String,
    pub referer: String,
    pub tree_activation_endpoint: String,
    pub replication_endpoint: String,
    pub page_version_endpoint: String,
    pub tree_activation_params: FormParams,
    pub activation_params: FormParams,
    pub deactivation_params: FormParams,
    /// Older repositories have no CSRF token endpoint; disable the token for them.
    pub use_token: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            diff_endpoint: DIFF_ENDPOINT.to_string(),
            token_endpoint: TOKEN_ENDPOINT.to_string(),
            referer: REFERER_PATH.to_string(),
            tree_activation_endpoint: ACTIVATION_TREE_ENDPOINT.to_string(),
            replication_endpoint: REPLICATION_ENDPOINT.to_string(),
            page_version_endpoint: PAGE_VERSION_ENDPOINT.to_string(),
            tree_activation_params: FormParams::new(),
            activation_params: FormParams::new(),
            deactivation_params: FormParams::new(),
            use_token: true,
        }
    }
}

impl ClientConfig {
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::async_try_from(path.as_ref()).await
    }

    fn apply_endpoint(
        target: &mut String,
        top_level: &LinkedHashMap<Yaml, Yaml>,
        key: &'static str,
    ) -> Result<(), ConfigError> {
        if let Some(value) = top_level.get(&Yaml::Value(Scalar::String(Cow::Borrowed(key)))) {
            *target = value
                .as_str()
                .ok_or(ConfigError::InvalidValue { key })?
                .to_string();
        }
        Ok(())
    }

    fn parse_params(
        top_level: &LinkedHashMap<Yaml, Yaml>,
        key: &'static str,
    ) -> Result<FormParams, ConfigError> {
        let Some(section) = top_level.get(&Yaml::Value(Scalar::String(Cow::Borrowed(key)))) else {
            return Ok(FormParams::new());
        };

        let params = section
            .as_mapping()
            .ok_or(ConfigError::InvalidValue { key })?
            .iter()
            .filter_map(|(name, value)| {
                let name = name.as_str()?;
                let value = match value {
                    Yaml::Value(Scalar::String(text)) => text.to_string(),
                    Yaml::Value(Scalar::Integer(number)) => number.to_string(),
                    Yaml::Value(Scalar::Boolean(flag)) => flag.to_string(),
                    _ => {
                        warn!("Skipping non-scalar value of '{}' in '{}'", name, key);
                        return None;
                    }
                };
                Some((name.to_string(), value))
            })
            .collect();

        Ok(params)
    }
}

impl AsyncTryFrom<&Path> for ClientConfig {
    type Error = ConfigError;

    async fn async_try_from(path: &Path) -> Result<Self, Self::Error> {
        debug!("Reading client config from {}", path.display());
        let bytes = fs::read(path).await.context(ReadSnafu {
            file_path: path.to_path_buf(),
        })?;
        let contents = String::from_utf8(bytes).context(EncodingSnafu {
            file_path: path.to_path_buf(),
        })?;
        contents.as_str().try_into()
    }
}

impl TryFrom<&str> for ClientConfig {
    type Error = ConfigError;

    fn try_from(contents: &str) -> Result<Self, Self::Error> {
        let documents = Yaml::load_from_str(contents).context(ParseSnafu)?;
        let document = documents.first().ok_or(ConfigError::MalformedConfig)?;
        let top_level = document.as_mapping().ok_or(ConfigError::TopLevelNotMap)?;

        let mut config = ClientConfig::default();
        Self::apply_endpoint(&mut config.diff_endpoint, top_level, "diff_endpoint")?;
        Self::apply_endpoint(&mut config.token_endpoint, top_level, "token_endpoint")?;
        Self::apply_endpoint(&mut config.referer, top_level, "referer")?;
        Self::apply_endpoint(
            &mut config.tree_activation_endpoint,
            top_level,
            "tree_activation_endpoint",
        )?;
        Self::apply_endpoint(
            &mut config.replication_endpoint,
            top_level,
            "replication_endpoint",
        )?;
        Self::apply_endpoint(
            &mut config.page_version_endpoint,
            top_level,
            "page_version_endpoint",
        )?;
        config.tree_activation_params = Self::parse_params(top_level, "tree_activation_params")?;
        config.activation_params = Self::parse_params(top_level, "activation_params")?;
        config.deactivation_params = Self::parse_params(top_level, "deactivation_params")?;

        if let Some(value) =
            top_level.get(&Yaml::Value(Scalar::String(Cow::Borrowed("use_token"))))
        {
            config.use_token = match value {
                Yaml::Value(Scalar::Boolean(flag)) => *flag,
                _ => return InvalidValueSnafu { key: "use_token" }.fail(),
            };
        }

        debug!("Parsed client config: {:?}", config);
        Ok(config)
    }
}

#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display("Failed to read the config file: {}", file_path.display()))]
    ReadError {
        file_path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Config file {} is not valid UTF-8", file_path.display()))]
    EncodingError {
        file_path: PathBuf,
        source: std::string::FromUtf8Error,
    },
    #[snafu(display("Failed to parse the config file"))]
    ParseError { source: saphyr::ScanError },
    #[snafu(display("Improperly formatted config file"))]
    MalformedConfig,
    #[snafu(display("Top level of config should be a map"))]
    TopLevelNotMap,
    #[snafu(display("Config key '{}' has a value of the wrong type", key))]
    InvalidValue { key: &'static str },
}
