//! Bind address settings for the HTTP services

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

/// Where a service listens
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl ServerSettings {
    /// Read `<PREFIX>_HOST` and `<PREFIX>_PORT`, falling back to
    /// `0.0.0.0:<default_port>`
    pub fn load(prefix: &str, default_port: u16) -> Result<Self, ConfigError> {
        Config::builder()
            .set_default("host", "0.0.0.0")?
            .set_default("port", i64::from(default_port))?
            .add_source(Environment::with_prefix(prefix).try_parsing(true))
            .build()?
            .try_deserialize()
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    #[serial]
    fn defaults_apply_without_environment() {
        unsafe {
            env::remove_var("PDTEST_HOST");
            env::remove_var("PDTEST_PORT");
        }

        let settings = ServerSettings::load("PDTEST", 3001).unwrap();
        assert_eq!(settings.bind_address(), "0.0.0.0:3001");
    }

    #[test]
    #[serial]
    fn environment_overrides_defaults() {
        unsafe {
            env::set_var("PDTEST_HOST", "127.0.0.1");
            env::set_var("PDTEST_PORT", "8080");
        }

        let settings = ServerSettings::load("PDTEST", 3001).unwrap();
        assert_eq!(
            settings,
            ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
            }
        );

        unsafe {
            env::remove_var("PDTEST_HOST");
            env::remove_var("PDTEST_PORT");
        }
    }
}
