//! Module manifests (`<module dir>/<name>.toml`)

use crate::error::ModuleError;
use config::{File, FileFormat};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct RawManifest {
    name: Option<String>,
    entry: Option<String>,
    #[serde(default)]
    version: String,
    #[serde(default)]
    description: String,
    #[serde(default = "enabled_by_default")]
    enabled: bool,
    #[serde(default)]
    settings: serde_json::Value,
}

fn enabled_by_default() -> bool {
    true
}

/// Identity and settings of one discovered module
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleManifest {
    pub name: String,
    /// Catalog key of the implementation
    pub entry: String,
    pub version: String,
    pub description: String,
    /// Whether startup enables the module
    pub enabled: bool,
    pub settings: serde_json::Value,
    pub source: PathBuf,
}

impl ModuleManifest {
    /// Read a manifest. `name` defaults to the file stem, `entry` to `name`.
    pub fn load(path: &Path) -> Result<Self, ModuleError> {
        let raw: RawManifest = config::Config::builder()
            .add_source(File::from(path).format(FileFormat::Toml))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|source| ModuleError::Manifest {
                path: path.to_path_buf(),
                source,
            })?;

        let name = raw
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| Self::name_from_path(path));
        let entry = raw.entry.unwrap_or_else(|| name.clone());

        Ok(Self {
            name,
            entry,
            version: raw.version,
            description: raw.description,
            enabled: raw.enabled,
            settings: raw.settings,
            source: path.to_path_buf(),
        })
    }

    /// Minimal manifest for modules registered in code
    pub fn new(name: impl Into<String>, entry: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            source: PathBuf::from(format!("{name}.toml")),
            name,
            entry: entry.into(),
            version: String::new(),
            description: String::new(),
            enabled: true,
            settings: serde_json::Value::Null,
        }
    }

    pub fn name_from_path(path: &Path) -> String {
        path.file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}
