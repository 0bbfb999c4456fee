use serde::{Deserialize, Serialize};

/// CLI configuration resolved from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Namespace Tasks and TaskRuns live in, unless overridden on the
    /// command line.
    pub namespace: String,
}

impl Config {
    pub fn load() -> crate::Result<Self> {
        // Load environment variables from .env file if it exists
        let _ = dotenvy::dotenv();

        let namespace =
            std::env::var("ANVIL_NAMESPACE").unwrap_or_else(|_| "default".to_string());
        if namespace.is_empty() {
            return Err(crate::Error::Config(
                "ANVIL_NAMESPACE must not be empty".to_string(),
            ));
        }

        Ok(Config { namespace })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
        }
    }
}
