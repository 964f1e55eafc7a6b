use std::borrow::Cow;
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use misc::*;

use crate::config::Config;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parsing(#[from] ron::de::Error),

    #[error("Config has already been initialized")]
    AlreadyInitialized,
}

type ConfigResult<T> = Result<T, ConfigError>;

pub enum ConfigType<'a> {
    String(&'a str),
    File(&'a Path),
}

static CONFIG: OnceCell<Arc<Config>> = OnceCell::new();

/// Must be called once only, and before [get]
pub fn init(cfg: ConfigType) -> ConfigResult<Arc<Config>> {
    // parse config and fail early
    let config = Arc::new(cfg.load()?);

    CONFIG
        .set(config.clone())
        .map_err(|_| ConfigError::AlreadyInitialized)?;

    info!("loaded config"; "agents" => config.agents.len(), "cell_size" => config.grid.cell_size);
    Ok(config)
}

/// Panics if [init] has not been called
pub fn get() -> Arc<Config> {
    CONFIG
        .get()
        .cloned()
        .expect("config has not been initialized")
}

impl<'a> ConfigType<'a> {
    pub fn load(&self) -> ConfigResult<Config> {
        let bytes = match self {
            ConfigType::String(s) => Cow::Borrowed(*s),
            ConfigType::File(path) => {
                let contents = std::fs::read_to_string(*path)?;
                Cow::Owned(contents)
            }
        };

        ron::de::from_str(&bytes).map_err(ConfigError::Parsing)
    }
}
