// Configuration loading for switchyard dispatchers

pub mod env;
pub mod error;
pub mod loader;
pub mod manifest;
pub mod validation;

pub use env::{ENV_PREFIX, EnvLoader};
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat};
pub use manifest::{InterceptorCatalog, InterceptorDeclaration, RouteManifest};
pub use validation::{ConfigValidator, Validate};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use switchyard_core::{DispatcherBuilder, DispatcherConfig, HandlerRegistry};
use tracing::{debug, info};

/// Everything a configuration source can describe.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchyardConfig {
    pub dispatcher: DispatcherConfig,
    pub routes: RouteManifest,
}

impl SwitchyardConfig {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Parse a single document and validate it.
    pub fn parse(content: &str, format: FileFormat) -> Result<Self> {
        Self::builder().source(content, format).build()
    }

    /// Dispatcher builder carrying this configuration. A non-empty route
    /// manifest becomes its first mapping.
    pub fn dispatcher_builder(
        &self,
        registry: Arc<dyn HandlerRegistry>,
        catalog: &InterceptorCatalog,
    ) -> Result<DispatcherBuilder> {
        let builder = DispatcherBuilder::new()
            .config(self.dispatcher.clone())
            .registry(Arc::clone(&registry));
        if self.routes.is_empty() {
            return Ok(builder);
        }
        let mapping = self.routes.build_mapping(registry, catalog, &self.dispatcher)?;
        Ok(builder.mapping(mapping))
    }
}

impl Validate for SwitchyardConfig {
    fn validate(&self) -> Result<()> {
        self.dispatcher.validate()?;
        self.routes.validate()
    }
}

enum Source {
    File(PathBuf, Option<FileFormat>),
    Inline(String, FileFormat),
}

/// Layered configuration loading.
///
/// Sources apply in order: `.env` first (it only feeds the environment),
/// then files and inline documents as added, then prefixed environment
/// variables last.
pub struct ConfigBuilder {
    sources: Vec<Source>,
    load_env: bool,
    load_dotenv: bool,
    dotenv_path: Option<PathBuf>,
    env_loader: EnvLoader,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            load_env: false,
            load_dotenv: false,
            dotenv_path: None,
            env_loader: EnvLoader::default(),
        }
    }

    /// Environment variable prefix; `SWITCHYARD` by default.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_loader = EnvLoader::new(prefix);
        self
    }

    /// Add a file; its format follows the extension.
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.sources.push(Source::File(path.into(), None));
        self
    }

    pub fn file_with_format(mut self, path: impl Into<PathBuf>, format: FileFormat) -> Self {
        self.sources.push(Source::File(path.into(), Some(format)));
        self
    }

    pub fn source(mut self, content: impl Into<String>, format: FileFormat) -> Self {
        self.sources.push(Source::Inline(content.into(), format));
        self
    }

    /// Apply prefixed environment variables over the file sources.
    pub fn load_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Read a `.env` file into the process environment before loading. A
    /// missing default `.env` is ignored; a missing explicit path is an error.
    pub fn load_dotenv(mut self, path: Option<PathBuf>) -> Self {
        self.load_dotenv = true;
        self.dotenv_path = path;
        self
    }

    pub fn build(self) -> Result<SwitchyardConfig> {
        if self.load_dotenv {
            match &self.dotenv_path {
                Some(path) => {
                    dotenvy::from_path(path).map_err(|e| ConfigError::LoadError(e.to_string()))?;
                }
                None => {
                    dotenvy::dotenv().ok();
                }
            }
        }

        let mut merged = Value::Object(serde_json::Map::new());
        for source in &self.sources {
            let value = match source {
                Source::File(path, format) => {
                    let format = match format {
                        Some(format) => *format,
                        None => FileFormat::detect(path)?,
                    };
                    debug!(path = %path.display(), ?format, "Loading configuration file");
                    ConfigLoader::new(format).load_file(path)?
                }
                Source::Inline(content, format) => ConfigLoader::new(*format).parse(content)?,
            };
            loader::merge(&mut merged, value);
        }

        if self.load_env {
            let overrides = self.env_loader.load();
            if !overrides.is_empty() {
                debug!(keys = ?overrides.keys().collect::<Vec<_>>(), "Applying environment overrides");
                let mut section = serde_json::Map::new();
                section.insert("dispatcher".to_string(), Value::Object(overrides));
                loader::merge(&mut merged, Value::Object(section));
            }
        }

        let config: SwitchyardConfig = serde_json::from_value(merged)
            .map_err(|e| ConfigError::DeserializationError(e.to_string()))?;
        config.validate()?;

        info!(
            routes = config.routes.paths.len(),
            throw_if_no_handler_found = config.dispatcher.throw_if_no_handler_found,
            "Configuration loaded"
        );
        Ok(config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
