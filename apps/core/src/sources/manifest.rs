use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::Deserialize;

use crate::model::{ActionHandle, ResultItem};
use crate::router::WILDCARD_KEYWORD;
use crate::source::{QueryContext, Source, SourceError, SourceMetadata, SourceOutput};

use super::match_score;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PluginManifest {
    pub id: String,
    pub name: String,
    pub version: String,
    pub enabled: bool,
    pub action_keywords: Vec<String>,
    pub items: Vec<ManifestItem>,
}

impl Default for PluginManifest {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            version: String::new(),
            enabled: true,
            action_keywords: vec![WILDCARD_KEYWORD.to_string()],
            items: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ManifestItem {
    pub id: String,
    pub title: String,
    pub subtitle: String,
    pub icon: String,
    #[serde(rename = "type")]
    pub action_type: String,
    pub path: String,
    pub url: String,
    pub command: String,
    pub args: Vec<String>,
}

impl Default for ManifestItem {
    fn default() -> Self {
        Self {
            id: String::new(),
            title: String::new(),
            subtitle: String::new(),
            icon: String::new(),
            action_type: "open_path".to_string(),
            path: String::new(),
            url: String::new(),
            command: String::new(),
            args: Vec::new(),
        }
    }
}

impl ManifestItem {
    pub fn action(&self) -> ActionHandle {
        match self.action_type.trim().to_ascii_lowercase().as_str() {
            "command" => ActionHandle::Command {
                command: self.command.trim().to_string(),
                args: self.args.clone(),
            },
            "open_url" | "url" => ActionHandle::OpenUrl {
                url: self.url.trim().to_string(),
            },
            "change_query" => ActionHandle::ChangeQuery {
                query: self.command.trim().to_string(),
            },
            _ => ActionHandle::OpenPath {
                path: self.path.trim().to_string(),
            },
        }
    }
}

#[derive(Debug)]
pub struct ManifestSource {
    path: PathBuf,
    manifest: RwLock<PluginManifest>,
}

impl ManifestSource {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        Ok(Self {
            path: path.to_path_buf(),
            manifest: RwLock::new(load_manifest(path)?),
        })
    }

    pub fn from_manifest(path: &Path, manifest: PluginManifest) -> Self {
        Self {
            path: path.to_path_buf(),
            manifest: RwLock::new(manifest),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn id(&self) -> String {
        self.manifest.read().id.trim().to_string()
    }

    pub fn metadata(&self) -> SourceMetadata {
        let manifest = self.manifest.read();
        let id = manifest.id.trim().to_string();
        let name = if manifest.name.trim().is_empty() {
            id.clone()
        } else {
            manifest.name.trim().to_string()
        };
        SourceMetadata {
            id,
            name,
            action_keywords: manifest.action_keywords.clone(),
            disabled: !manifest.enabled,
        }
    }
}

impl Source for ManifestSource {
    fn query(&self, ctx: &QueryContext<'_>) -> Result<SourceOutput, SourceError> {
        let manifest = self.manifest.read();
        let search = ctx.query.search.as_str();
        let plugin_id = manifest.id.trim();

        let mut results = Vec::new();
        for item in &manifest.items {
            if ctx.is_cancelled() {
                break;
            }
            let title = item.title.trim();
            if title.is_empty() {
                continue;
            }
            let score = if search.is_empty() {
                0
            } else {
                match match_score(ctx.matcher, search, title, &item.subtitle) {
                    0 => continue,
                    score => score,
                }
            };
            let key = if item.id.trim().is_empty() {
                title.to_string()
            } else {
                item.id.trim().to_string()
            };
            results.push(
                ResultItem::new(title, item.subtitle.trim())
                    .with_icon(&item.icon)
                    .with_score(score)
                    .with_action(item.action())
                    .with_history_key(&format!("plugin:{plugin_id}:{key}")),
            );
        }
        Ok(results.into())
    }

    fn reload(&self) -> Result<usize, SourceError> {
        let fresh = load_manifest(&self.path)?;
        let count = fresh.items.len();
        *self.manifest.write() = fresh;
        Ok(count)
    }
}

pub fn load_all(paths: &[PathBuf]) -> (Vec<ManifestSource>, Vec<String>) {
    let mut sources = Vec::new();
    let mut warnings = Vec::new();
    for path in paths {
        for manifest_path in discover_manifest_paths(path) {
            match ManifestSource::open(&manifest_path) {
                Ok(source) => sources.push(source),
                Err(error) => warnings.push(format!(
                    "plugin manifest '{}' failed: {error}",
                    manifest_path.display()
                )),
            }
        }
    }
    (sources, warnings)
}

pub fn discover_manifest_paths(path: &Path) -> Vec<PathBuf> {
    if path.is_file() {
        return vec![path.to_path_buf()];
    }
    if !path.is_dir() {
        return Vec::new();
    }

    let mut out = Vec::new();
    if let Ok(entries) = std::fs::read_dir(path) {
        for entry in entries.flatten() {
            let entry_path = entry.path();
            if entry_path.is_file()
                && entry_path
                    .extension()
                    .and_then(|v| v.to_str())
                    .is_some_and(|v| v.eq_ignore_ascii_case("json"))
            {
                out.push(entry_path);
            }
        }
    }
    out.sort();
    out
}

pub fn load_manifest(path: &Path) -> Result<PluginManifest, SourceError> {
    let raw = std::fs::read_to_string(path)?;
    let manifest: PluginManifest = serde_json::from_str(&raw)
        .map_err(|e| SourceError::InvalidResponse(format!("invalid json in '{}': {e}", path.display())))?;
    if manifest.id.trim().is_empty() {
        return Err(SourceError::InvalidResponse("missing plugin id".to_string()));
    }
    Ok(manifest)
}
