use crate::{DirectoryModLoader, ModError, ScriptBridge};
use cardshifter_core::{AiStrategy, FirstChoiceAi, RandomAi, RuleSet, VanillaRules};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{debug, warn};

pub type ModFactory = Rc<dyn Fn() -> Result<Box<dyn RuleSet>, ModError>>;
pub type AiFactory = Rc<dyn Fn(u64) -> Box<dyn AiStrategy>>;

pub const DEFAULT_MOD_DIR: &str = "cardshifter-mods";

/// Named rule-set and AI factories in registration order.
///
/// Factories run only on [`ModRegistry::instantiate`], so a registry can hand
/// out independent rule-sets to any number of sessions.
pub struct ModRegistry {
    mods: Vec<(String, ModFactory)>,
    ais: Vec<(String, AiFactory)>,
    bridges: Vec<Rc<dyn ScriptBridge>>,
}

impl ModRegistry {
    /// Registry holding the built-in rule-sets, AIs and compiled-in backends.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register("Vanilla", || Ok(Box::new(VanillaRules::default())));
        #[cfg(feature = "mod_lua")]
        {
            registry.register("Skirmish", || {
                crate::LuaRuleSet::skirmish().map(|rules| Box::new(rules) as Box<dyn RuleSet>)
            });
            registry.add_bridge(Rc::new(crate::LuaBridge));
        }
        #[cfg(feature = "mod_wasm")]
        registry.add_bridge(Rc::new(crate::WasmBridge::new()));
        registry.register_ai("Loser", |_| Box::new(FirstChoiceAi));
        registry.register_ai("Idiot", |seed| Box::new(RandomAi::new(seed)));
        registry
    }

    pub fn empty() -> Self {
        Self {
            mods: Vec::new(),
            ais: Vec::new(),
            bridges: Vec::new(),
        }
    }

    /// A name registered twice keeps its first position and the latest factory.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Result<Box<dyn RuleSet>, ModError> + 'static,
    {
        let name = name.into();
        let factory: ModFactory = Rc::new(factory);
        match self.mods.iter_mut().find(|(key, _)| *key == name) {
            Some(slot) => {
                debug!(mod_name = %name, "replacing mod factory");
                slot.1 = factory;
            }
            None => {
                debug!(mod_name = %name, "registering mod");
                self.mods.push((name, factory));
            }
        }
    }

    pub fn register_ai<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(u64) -> Box<dyn AiStrategy> + 'static,
    {
        let name = name.into();
        let factory: AiFactory = Rc::new(factory);
        match self.ais.iter_mut().find(|(key, _)| *key == name) {
            Some(slot) => slot.1 = factory,
            None => self.ais.push((name, factory)),
        }
    }

    pub fn add_bridge(&mut self, bridge: Rc<dyn ScriptBridge>) {
        self.bridges.push(bridge);
    }

    pub fn available_mods(&self) -> Vec<&str> {
        self.mods.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.mods.iter().any(|(key, _)| key == name)
    }

    /// Runs the factory for `name`; unknown names and failing factories give
    /// `None`.
    pub fn instantiate(&self, name: &str) -> Option<Box<dyn RuleSet>> {
        let Some((_, factory)) = self.mods.iter().find(|(key, _)| key == name) else {
            debug!(mod_name = name, "no such mod");
            return None;
        };
        match factory() {
            Ok(rules) => Some(rules),
            Err(err) => {
                warn!(mod_name = name, error = %err, "failed to load mod");
                None
            }
        }
    }

    /// Registers every mod found under `dir`; returns how many were found.
    pub fn load_external(&mut self, dir: impl AsRef<Path>) -> usize {
        let dir = dir.as_ref();
        if !dir.exists() {
            warn!(path = %dir.display(), "mod directory does not exist");
            return 0;
        }
        if !dir.is_dir() {
            warn!(path = %dir.display(), "mod location is not a directory");
            return 0;
        }
        let loader = Rc::new(DirectoryModLoader::new(dir, self.bridges.clone()));
        let names = match loader.available_mods() {
            Ok(names) => names,
            Err(err) => {
                warn!(path = %dir.display(), error = %err, "failed to scan mod directory");
                return 0;
            }
        };
        for name in &names {
            let loader = loader.clone();
            let key = name.clone();
            self.register(name.clone(), move || loader.load(&key));
        }
        debug!(path = %dir.display(), count = names.len(), "external mods registered");
        names.len()
    }

    pub fn ais(&self) -> Vec<&str> {
        self.ais.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn ai(&self, name: &str, seed: u64) -> Option<Box<dyn AiStrategy>> {
        self.ais
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, factory)| factory(seed))
    }

    /// `<home>/cardshifter-mods`, when a home directory is known.
    pub fn default_mod_location() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(DEFAULT_MOD_DIR))
    }
}

impl Default for ModRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_listed_in_order() {
        let registry = ModRegistry::new();
        let mods = registry.available_mods();
        assert_eq!(mods[0], "Vanilla");
        #[cfg(feature = "mod_lua")]
        assert_eq!(mods, vec!["Vanilla", "Skirmish"]);
        assert_eq!(registry.ais(), vec!["Loser", "Idiot"]);
    }

    #[test]
    fn reregistering_keeps_position_and_replaces_factory() {
        let mut registry = ModRegistry::empty();
        registry.register("A", || Err(ModError::Runtime("old".to_string())));
        registry.register("B", || Ok(Box::new(VanillaRules::default())));
        registry.register("A", || Ok(Box::new(VanillaRules::default())));
        assert_eq!(registry.available_mods(), vec!["A", "B"]);
        assert!(registry.instantiate("A").is_some());
    }

    #[test]
    fn failing_factory_yields_none() {
        let mut registry = ModRegistry::empty();
        registry.register("Broken", || Err(ModError::Runtime("boom".to_string())));
        assert!(registry.contains("Broken"));
        assert!(registry.instantiate("Broken").is_none());
        assert!(registry.instantiate("Missing").is_none());
    }

    #[test]
    fn ai_lookup_by_name() {
        let registry = ModRegistry::new();
        assert_eq!(registry.ai("Idiot", 3).expect("idiot").name(), "Idiot");
        assert_eq!(registry.ai("Loser", 3).expect("loser").name(), "Loser");
        assert!(registry.ai("Genius", 3).is_none());
    }

    #[test]
    fn default_location_ends_with_mod_dir() {
        if let Some(path) = ModRegistry::default_mod_location() {
            assert!(path.ends_with(DEFAULT_MOD_DIR));
        }
    }
}
