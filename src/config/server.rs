//! HTTP surface settings: deployment namespace and the app-version gate.

use super::defaults::{default_app_version, default_deploy_env};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Deployment environment. Prefixes every cache key and names the
    /// logical database so several environments can share infrastructure.
    #[serde(default = "default_deploy_env")]
    pub deploy_env: String,
    /// Expected client application version for gated routes.
    #[serde(default = "default_app_version")]
    pub app_version: String,
    /// Disable the app-version gate entirely (internal environments).
    #[serde(default)]
    pub skip_app_version_check: bool,
    /// Comma-separated CORS origins, `*` for permissive.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: String,
}

fn default_cors_origins() -> String {
    "*".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            deploy_env: default_deploy_env(),
            app_version: default_app_version(),
            skip_app_version_check: false,
            cors_origins: default_cors_origins(),
        }
    }
}
