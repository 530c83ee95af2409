use crate::api::{ModManifest, ScriptBridge};
use cardshifter_core::RuleSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ModError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),
    #[error("invalid mod id: {0}")]
    InvalidId(String),
    #[error("not a mod directory: {}", .0.display())]
    NotADirectory(PathBuf),
    #[error("mod not found: {0}")]
    NotFound(String),
    #[error("no backend recognizes mod {0}")]
    NoBackend(String),
    #[error("runtime error: {0}")]
    Runtime(String),
    #[error("runtime unavailable: {0}")]
    RuntimeUnavailable(String),
}

pub const MANIFEST_FILE: &str = "mod.json";

/// Finds mods in the subdirectories of one root directory.
///
/// Discovery only checks names and marker files; backend code is read by
/// [`DirectoryModLoader::load`].
pub struct DirectoryModLoader {
    root: PathBuf,
    bridges: Vec<Rc<dyn ScriptBridge>>,
}

impl DirectoryModLoader {
    pub fn new(root: impl Into<PathBuf>, bridges: Vec<Rc<dyn ScriptBridge>>) -> Self {
        Self {
            root: root.into(),
            bridges,
        }
    }

    /// Candidate mod names, sorted.
    pub fn available_mods(&self) -> Result<Vec<String>, ModError> {
        if !self.root.is_dir() {
            return Err(ModError::NotADirectory(self.root.clone()));
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            if !is_valid_id(name) || self.bridge_for(&path).is_none() {
                continue;
            }
            names.push(name.to_string());
        }
        names.sort();
        Ok(names)
    }

    pub fn load(&self, name: &str) -> Result<Box<dyn RuleSet>, ModError> {
        if !is_valid_id(name) {
            return Err(ModError::InvalidId(name.to_string()));
        }
        let dir = self.root.join(name);
        if !dir.is_dir() {
            return Err(ModError::NotFound(name.to_string()));
        }
        if let Some(manifest) = read_manifest(&dir)? {
            validate_manifest(&dir, &manifest)?;
        }
        let bridge = self
            .bridge_for(&dir)
            .ok_or_else(|| ModError::NoBackend(name.to_string()))?;
        info!(mod_name = name, backend = bridge.backend(), "loading mod");
        bridge.load_ruleset(name, &dir)
    }

    fn bridge_for(&self, dir: &Path) -> Option<&Rc<dyn ScriptBridge>> {
        self.bridges.iter().find(|bridge| bridge.accepts(dir))
    }
}

/// Reads `mod.json` when present.
pub fn read_manifest(dir: &Path) -> Result<Option<ModManifest>, ModError> {
    let path = dir.join(MANIFEST_FILE);
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(&path)?;
    let manifest: ModManifest =
        serde_json::from_str(&raw).map_err(|err| ModError::InvalidManifest(err.to_string()))?;
    Ok(Some(manifest))
}

fn validate_manifest(root: &Path, manifest: &ModManifest) -> Result<(), ModError> {
    let id = manifest.meta.id.trim();
    if !is_valid_id(id) {
        return Err(ModError::InvalidId(id.to_string()));
    }
    if let Some(dir_name) = root.file_name().and_then(|name| name.to_str()) {
        if dir_name != id {
            return Err(ModError::InvalidManifest(format!(
                "mod id {} does not match directory {}",
                id, dir_name
            )));
        }
    }
    Ok(())
}

pub fn is_valid_id(value: &str) -> bool {
    if value.is_empty() {
        return false;
    }
    value
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-')
}
