//! WebAssembly rule-sets.
//!
//! A module exports `memory`, `alloc(len) -> ptr`, `setup(ptr, len)` and
//! `on_action(ptr, len)`, and may export `on_event(ptr, len)` and
//! `dealloc(ptr, len)`. Calls take a JSON request written into memory at the
//! pointer returned by `alloc` and return the reply location packed into an
//! `i64` as `ptr << 32 | len`. Replies carry game commands, new actions and,
//! for action queries, the answer.

use crate::{ModError, ScriptBridge};
use cardshifter_core::{
    Action, ActionError, EntityId, Game, GameCommand, GameError, GameEvent, GameView, RuleSet,
    RuleSetError, TargetAction, UsableAction,
};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use tracing::warn;
use wasmtime::{Engine, Instance, Memory, Module, Store, TypedFunc};

const MARKER: &str = "game.wasm";

/// Loads `game.wasm` mods.
pub struct WasmBridge {
    engine: Engine,
}

impl WasmBridge {
    pub fn new() -> Self {
        Self {
            engine: Engine::default(),
        }
    }
}

impl Default for WasmBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptBridge for WasmBridge {
    fn backend(&self) -> &'static str {
        "wasm"
    }

    fn marker(&self) -> &'static str {
        MARKER
    }

    fn load_ruleset(&self, name: &str, dir: &Path) -> Result<Box<dyn RuleSet>, ModError> {
        let module = Module::from_file(&self.engine, dir.join(MARKER))
            .map_err(|err| ModError::Runtime(err.to_string()))?;
        let rules = WasmRuleSet::from_module(&self.engine, name, &module)?;
        Ok(Box::new(rules))
    }
}

#[derive(Debug, Deserialize)]
struct ActionDecl {
    owner: EntityId,
    name: String,
    #[serde(default)]
    targeted: bool,
}

#[derive(Debug, Default, Deserialize)]
struct WasmReply {
    #[serde(default)]
    commands: Vec<GameCommand>,
    #[serde(default)]
    actions: Vec<ActionDecl>,
    #[serde(default)]
    allowed: Option<bool>,
    #[serde(default)]
    targets: Vec<EntityId>,
}

#[derive(Serialize)]
struct SetupRequest<'a> {
    name: &'a str,
    game: GameView,
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
enum Phase {
    Allowed,
    Targets,
    Perform,
}

#[derive(Serialize)]
struct ActionRequest<'a> {
    phase: Phase,
    owner: EntityId,
    action: &'a str,
    target: Option<EntityId>,
    game: GameView,
}

#[derive(Serialize)]
struct EventRequest<'a> {
    event: &'a GameEvent,
    game: GameView,
}

#[derive(Clone, Copy)]
enum Export {
    Setup,
    Action,
    Event,
}

struct WasmInstance {
    store: Store<()>,
    memory: Memory,
    alloc: TypedFunc<i32, i32>,
    setup: TypedFunc<(i32, i32), i64>,
    on_action: TypedFunc<(i32, i32), i64>,
    on_event: Option<TypedFunc<(i32, i32), i64>>,
    dealloc: Option<TypedFunc<(i32, i32), ()>>,
}

impl WasmInstance {
    fn new(engine: &Engine, module: &Module) -> Result<Self, ModError> {
        let mut store = Store::new(engine, ());
        let instance = Instance::new(&mut store, module, &[])
            .map_err(|err| ModError::Runtime(err.to_string()))?;
        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or_else(|| ModError::Runtime("wasm export memory is required".to_string()))?;
        let alloc = instance
            .get_typed_func::<i32, i32>(&mut store, "alloc")
            .map_err(|err| ModError::Runtime(format!("wasm export alloc missing: {}", err)))?;
        let setup = instance
            .get_typed_func::<(i32, i32), i64>(&mut store, "setup")
            .map_err(|err| ModError::Runtime(format!("wasm export setup missing: {}", err)))?;
        let on_action = instance
            .get_typed_func::<(i32, i32), i64>(&mut store, "on_action")
            .map_err(|err| ModError::Runtime(format!("wasm export on_action missing: {}", err)))?;
        let on_event = instance
            .get_typed_func::<(i32, i32), i64>(&mut store, "on_event")
            .ok();
        let dealloc = instance
            .get_typed_func::<(i32, i32), ()>(&mut store, "dealloc")
            .ok();
        Ok(Self {
            store,
            memory,
            alloc,
            setup,
            on_action,
            on_event,
            dealloc,
        })
    }

    fn call_json<T: Serialize>(&mut self, export: Export, request: &T) -> Result<WasmReply, String> {
        let func = match export {
            Export::Setup => self.setup.clone(),
            Export::Action => self.on_action.clone(),
            Export::Event => match self.on_event.clone() {
                Some(func) => func,
                None => return Ok(WasmReply::default()),
            },
        };
        let input = serde_json::to_vec(request).map_err(|err| err.to_string())?;
        let in_len = i32::try_from(input.len()).map_err(|_| "payload too large".to_string())?;
        let in_ptr = self
            .alloc
            .call(&mut self.store, in_len)
            .map_err(|err| format!("alloc failed: {}", err))?;
        if in_ptr < 0 {
            return Err("alloc returned negative pointer".to_string());
        }
        self.memory
            .write(&mut self.store, in_ptr as usize, &input)
            .map_err(|err| format!("write memory failed: {}", err))?;

        let out_packed = func
            .call(&mut self.store, (in_ptr, in_len))
            .map_err(|err| format!("call failed: {}", err))?;
        if let Some(dealloc) = &self.dealloc {
            let _ = dealloc.call(&mut self.store, (in_ptr, in_len));
        }

        let (out_ptr, out_len) = unpack_ptr_len(out_packed);
        if out_len == 0 {
            return Ok(WasmReply::default());
        }
        let mut output = vec![0u8; out_len];
        self.memory
            .read(&self.store, out_ptr, &mut output)
            .map_err(|err| format!("read memory failed: {}", err))?;
        if let Some(dealloc) = &self.dealloc {
            let _ = dealloc.call(&mut self.store, (out_ptr as i32, out_len as i32));
        }
        serde_json::from_slice(&output).map_err(|err| format!("invalid reply: {}", err))
    }
}

fn unpack_ptr_len(value: i64) -> (usize, usize) {
    let raw = value as u64;
    let ptr = (raw >> 32) as u32 as usize;
    let len = (raw & 0xffff_ffff) as u32 as usize;
    (ptr, len)
}

/// A rule-set backed by one module instance.
pub struct WasmRuleSet {
    name: String,
    instance: Rc<RefCell<WasmInstance>>,
}

impl WasmRuleSet {
    pub fn from_module(engine: &Engine, name: &str, module: &Module) -> Result<Self, ModError> {
        let instance = WasmInstance::new(engine, module)?;
        Ok(Self {
            name: name.to_string(),
            instance: Rc::new(RefCell::new(instance)),
        })
    }

    /// Accepts binary modules and, with wasmtime's default features, WAT text.
    pub fn from_bytes(engine: &Engine, name: &str, bytes: impl AsRef<[u8]>) -> Result<Self, ModError> {
        let module =
            Module::new(engine, bytes).map_err(|err| ModError::Runtime(err.to_string()))?;
        Self::from_module(engine, name, &module)
    }

    fn call<T: Serialize>(&self, export: Export, request: &T) -> Result<WasmReply, String> {
        let mut instance = self
            .instance
            .try_borrow_mut()
            .map_err(|_| "module re-entered".to_string())?;
        instance.call_json(export, request)
    }

    fn apply(&self, game: &mut Game, reply: WasmReply) -> Result<(), GameError> {
        let mut staged = game.clone();
        for command in reply.commands {
            staged.apply(command)?;
        }
        for decl in reply.actions {
            let action = Rc::new(WasmAction {
                rules: self.handle(),
                owner: decl.owner,
                name: decl.name.clone(),
            });
            let action = if decl.targeted {
                Action::from_target(decl.owner, decl.name, action)
            } else {
                Action::from_usable(decl.owner, decl.name, action)
            };
            staged.add_action(action)?;
        }
        *game = staged;
        Ok(())
    }

    fn handle(&self) -> WasmRuleSet {
        WasmRuleSet {
            name: self.name.clone(),
            instance: Rc::clone(&self.instance),
        }
    }
}

impl RuleSet for WasmRuleSet {
    fn name(&self) -> &str {
        &self.name
    }

    fn bind(&mut self, game: &mut Game) -> Result<(), RuleSetError> {
        let request = SetupRequest {
            name: &self.name,
            game: game.view(),
        };
        let reply = self
            .call(Export::Setup, &request)
            .map_err(RuleSetError::Script)?;
        self.apply(game, reply)?;
        Ok(())
    }

    fn on_event(&mut self, game: &mut Game, event: &GameEvent) -> Result<(), RuleSetError> {
        let request = EventRequest {
            event,
            game: game.view(),
        };
        let reply = self
            .call(Export::Event, &request)
            .map_err(RuleSetError::Script)?;
        self.apply(game, reply)?;
        Ok(())
    }
}

/// An action declared by a module; every query goes back through `on_action`.
struct WasmAction {
    rules: WasmRuleSet,
    owner: EntityId,
    name: String,
}

impl WasmAction {
    fn query(&self, phase: Phase, game: &Game, target: Option<EntityId>) -> Result<WasmReply, String> {
        let request = ActionRequest {
            phase,
            owner: self.owner,
            action: &self.name,
            target,
            game: game.view(),
        };
        self.rules.call(Export::Action, &request)
    }

    fn check_allowed(&self, game: &Game) -> bool {
        match self.query(Phase::Allowed, game, None) {
            Ok(reply) => reply.allowed.unwrap_or(false),
            Err(err) => {
                warn!(mod_name = %self.rules.name, action = %self.name, error = %err, "allowed check failed");
                false
            }
        }
    }

    fn run(&self, game: &mut Game, target: Option<EntityId>) -> Result<(), ActionError> {
        let reply = self
            .query(Phase::Perform, game, target)
            .map_err(ActionError::Script)?;
        if reply.allowed == Some(false) {
            return Err(ActionError::Rejected(self.name.clone()));
        }
        self.rules.apply(game, reply)?;
        Ok(())
    }
}

impl UsableAction for WasmAction {
    fn is_allowed(&self, game: &Game) -> bool {
        self.check_allowed(game)
    }

    fn perform(&self, game: &mut Game) -> Result<(), ActionError> {
        self.run(game, None)
    }
}

impl TargetAction for WasmAction {
    fn is_allowed(&self, game: &Game) -> bool {
        self.check_allowed(game)
    }

    fn find_targets(&self, game: &Game) -> Vec<EntityId> {
        match self.query(Phase::Targets, game, None) {
            Ok(reply) => reply.targets,
            Err(err) => {
                warn!(mod_name = %self.rules.name, action = %self.name, error = %err, "target query failed");
                Vec::new()
            }
        }
    }

    fn perform_on(&self, game: &mut Game, target: EntityId) -> Result<(), ActionError> {
        self.run(game, Some(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardshifter_core::{DataValue, Session};

    const SETUP_PTR: u64 = 1024;
    const ACTION_PTR: u64 = 2048;

    fn packed(ptr: u64, json: &str) -> i64 {
        ((ptr << 32) | json.len() as u64) as i64
    }

    fn wat_string(json: &str) -> String {
        json.replace('\\', "\\\\").replace('"', "\\\"")
    }

    /// A module answering every call with fixed JSON.
    fn module_text(setup: &str, action: &str) -> String {
        format!(
            r#"(module
                (memory (export "memory") 1)
                (data (i32.const {setup_ptr}) "{setup_data}")
                (data (i32.const {action_ptr}) "{action_data}")
                (func (export "alloc") (param i32) (result i32) i32.const 8192)
                (func (export "setup") (param i32 i32) (result i64) i64.const {setup_packed})
                (func (export "on_action") (param i32 i32) (result i64) i64.const {action_packed}))"#,
            setup_ptr = SETUP_PTR,
            setup_data = wat_string(setup),
            action_ptr = ACTION_PTR,
            action_data = wat_string(action),
            setup_packed = packed(SETUP_PTR, setup),
            action_packed = packed(ACTION_PTR, action),
        )
    }

    const SETUP: &str = r#"{"commands":[{"op":"add_player","name":"A"},{"op":"add_player","name":"B"},{"op":"set_data","entity":2,"key":"life","value":5}],"actions":[{"owner":1,"name":"Hit","targeted":true}]}"#;
    const HIT: &str = r#"{"allowed":true,"targets":[2],"commands":[{"op":"set_data","entity":2,"key":"life","value":4}]}"#;

    fn rules(setup: &str, action: &str) -> WasmRuleSet {
        let engine = Engine::default();
        WasmRuleSet::from_bytes(&engine, "Fixed", module_text(setup, action)).expect("module")
    }

    #[test]
    fn unpacks_ptr_len() {
        let packed = ((7u64 << 32) | 13u64) as i64;
        let (ptr, len) = unpack_ptr_len(packed);
        assert_eq!(ptr, 7);
        assert_eq!(len, 13);
    }

    #[test]
    fn setup_reply_builds_game_and_actions() {
        let mut session = Session::new(Box::new(rules(SETUP, HIT)), 0).expect("bind");
        session.start().expect("start");
        let game = session.game();
        assert_eq!(game.players().len(), 2);
        assert_eq!(game.data(EntityId(2), "life"), Some(&DataValue::Int(5)));
        let listed = session.list_actions();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].is_target());
    }

    #[test]
    fn action_reply_commands_are_applied() {
        let mut session = Session::new(Box::new(rules(SETUP, HIT)), 0).expect("bind");
        session.start().expect("start");
        let listed = session.list_actions();
        let mut first = |_: &Game, _: &Action, targets: &[EntityId]| -> Option<usize> {
            assert_eq!(targets, &[EntityId(2)]);
            Some(0)
        };
        let performed = session.dispatch(&listed, 0, &mut first).expect("dispatch");
        assert_eq!(performed.target, Some(EntityId(2)));
        assert_eq!(
            session.game().data(EntityId(2), "life"),
            Some(&DataValue::Int(4))
        );
    }

    #[test]
    fn bad_command_rejects_the_whole_reply() {
        let bad = r#"{"allowed":true,"targets":[2],"commands":[{"op":"set_data","entity":2,"key":"life","value":1},{"op":"move_card","card":9,"zone":9}]}"#;
        let mut session = Session::new(Box::new(rules(SETUP, bad)), 0).expect("bind");
        session.start().expect("start");
        let listed = session.list_actions();
        let mut first = |_: &Game, _: &Action, _: &[EntityId]| -> Option<usize> { Some(0) };
        assert!(session.dispatch(&listed, 0, &mut first).is_err());
        assert_eq!(
            session.game().data(EntityId(2), "life"),
            Some(&DataValue::Int(5))
        );
    }

    #[test]
    fn missing_exports_fail_to_load() {
        let engine = Engine::default();
        let result = WasmRuleSet::from_bytes(&engine, "Empty", r#"(module (memory (export "memory") 1))"#);
        assert!(matches!(result, Err(ModError::Runtime(_))));
    }

    #[test]
    fn bridge_loads_from_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(MARKER), module_text(SETUP, HIT)).expect("write");
        let bridge = WasmBridge::new();
        assert!(bridge.accepts(dir.path()));
        let rules = bridge.load_ruleset("Fixed", dir.path()).expect("load");
        assert_eq!(rules.name(), "Fixed");
    }
}
