mod config;
mod load;

pub use config::*;
pub use load::{get, init, ConfigError, ConfigType};
