use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,
}

/// Gateway configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Serves `/content-entries`
    #[serde(default = "default_listener")]
    pub listener: Listener,
    /// Serves `/health` and `/ready`
    #[serde(default = "default_admin_listener")]
    pub admin_listener: Listener,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listener: default_listener(),
            admin_listener: default_admin_listener(),
        }
    }
}

fn default_listener() -> Listener {
    Listener {
        host: "127.0.0.1".into(),
        port: 10010,
    }
}

fn default_admin_listener() -> Listener {
    Listener {
        host: "127.0.0.1".into(),
        port: 10011,
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}
