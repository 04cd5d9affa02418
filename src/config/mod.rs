//! Configuration System
//!
//! Settings are layered with Figment, highest precedence first:
//! 1. Environment variables prefixed with `VNA_`, key segments separated by `__`
//! 2. TOML configuration file (default: `config/vna.toml`)
//! 3. Built-in defaults
//!
//! ```no_run
//! use vna_daq::config::VnaConfig;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = VnaConfig::load()?;
//!     println!("Instrument: {}", config.connection);
//!     println!("Log level: {}", config.application.log_level);
//!     Ok(())
//! }
//! ```

pub mod settings;

pub use settings::{
    ApplicationConfig, ConfigError, OutputConfig, TimingConfig, VnaConfig, DEFAULT_CONFIG_PATH,
    ENV_PREFIX,
};
