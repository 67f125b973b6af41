//! Version and build metadata for `hearth-gateway build-info`

use serde::Serialize;
use std::fmt;

/// Everything compiled into this binary that identifies the build
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    pub twilight_version: &'static str,
    pub gateway_api_version: u8,
    pub http_api_version: u8,
    pub build_date: &'static str,
    pub commit: &'static str,
    pub branch: &'static str,
    pub rustc_version: &'static str,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            twilight_version: env!("HEARTH_TWILIGHT_VERSION"),
            gateway_api_version: twilight_gateway::API_VERSION,
            http_api_version: twilight_http::API_VERSION,
            build_date: env!("HEARTH_BUILD_DATE"),
            commit: env!("HEARTH_GIT_COMMIT"),
            branch: env!("HEARTH_GIT_BRANCH"),
            rustc_version: env!("HEARTH_RUSTC_VERSION"),
        }
    }
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "hearth-gateway {}", self.version)?;
        writeln!(f, "  twilight:      {}", self.twilight_version)?;
        writeln!(f, "  gateway API:   v{}", self.gateway_api_version)?;
        writeln!(f, "  REST API:      v{}", self.http_api_version)?;
        writeln!(f, "  build date:    {}", self.build_date)?;
        writeln!(f, "  commit:        {} ({})", self.commit, self.branch)?;
        write!(f, "  rustc:         {}", self.rustc_version)
    }
}
