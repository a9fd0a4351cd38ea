use serde::Deserialize;
use url::Url;

/// Connection settings for the meeting backend
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// API root, e.g. `http://localhost:8000/api`
    #[serde(default = "default_base_url")]
    pub base_url: Url,
    /// TCP connect timeout (e.g. "10s")
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

fn default_base_url() -> Url {
    Url::parse("http://localhost:8000/api").expect("default base URL must be valid")
}

fn default_connect_timeout() -> String {
    "10s".to_owned()
}
