use crate::ModError;
use cardshifter_core::RuleSet;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModMetadata {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// Optional `mod.json` next to the backend entry file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModManifest {
    pub meta: ModMetadata,
    #[serde(default)]
    pub description: Option<String>,
}

/// Adapter a scripting backend implements so its mods load as [`RuleSet`]s.
pub trait ScriptBridge {
    /// Short backend name for logs, e.g. `lua`.
    fn backend(&self) -> &'static str;

    /// File whose presence marks a directory as a mod for this backend.
    fn marker(&self) -> &'static str;

    fn load_ruleset(&self, name: &str, dir: &Path) -> Result<Box<dyn RuleSet>, ModError>;

    fn accepts(&self, dir: &Path) -> bool {
        dir.join(self.marker()).is_file()
    }
}
