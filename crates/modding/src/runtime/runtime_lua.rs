use crate::{ModError, ScriptBridge};
use cardshifter_core::{
    Action, ActionError, DataValue, EntityId, Game, GameEvent, RuleSet, RuleSetError,
    TargetAction, UsableAction, Visibility, ZoneId,
};
use mlua::{Function, Lua, LuaSerdeExt, RegistryKey, Scope, SerializeOptions, Table, Value};
use std::cell::RefCell;
use std::fmt::Display;
use std::fs;
use std::path::Path;
use std::rc::Rc;
use tracing::{info, warn};

const MARKER: &str = "game.lua";
const SKIRMISH: &str = include_str!("../../scripts/skirmish.lua");

/// Loads `game.lua` mods.
#[derive(Debug, Default)]
pub struct LuaBridge;

impl ScriptBridge for LuaBridge {
    fn backend(&self) -> &'static str {
        "lua"
    }

    fn marker(&self) -> &'static str {
        MARKER
    }

    fn load_ruleset(&self, name: &str, dir: &Path) -> Result<Box<dyn RuleSet>, ModError> {
        let rules = LuaRuleSet::from_file(name, &dir.join(MARKER))?;
        Ok(Box::new(rules))
    }
}

/// A rule-set written in Lua.
///
/// The script defines `setup(game)` and optionally `on_event(game, event)`.
/// `game` is a table of functions that is only valid during the call it was
/// passed to.
pub struct LuaRuleSet {
    name: String,
    lua: Rc<Lua>,
    setup: RegistryKey,
    on_event: Option<RegistryKey>,
}

impl LuaRuleSet {
    pub fn from_source(name: impl Into<String>, source: &str) -> Result<Self, ModError> {
        let name = name.into();
        let lua = Rc::new(Lua::new());
        let (setup, on_event) = {
            lua.load(source)
                .set_name(name.as_str())
                .exec()
                .map_err(runtime_error)?;
            let globals = lua.globals();
            let setup: Option<Function> = globals.get("setup").map_err(runtime_error)?;
            let setup = setup.ok_or_else(|| {
                ModError::Runtime(format!("{} does not define setup(game)", name))
            })?;
            let on_event: Option<Function> = globals.get("on_event").map_err(runtime_error)?;
            let setup = lua.create_registry_value(setup).map_err(runtime_error)?;
            let on_event = on_event
                .map(|func| lua.create_registry_value(func))
                .transpose()
                .map_err(runtime_error)?;
            (setup, on_event)
        };
        Ok(Self {
            name,
            lua,
            setup,
            on_event,
        })
    }

    pub fn from_file(name: impl Into<String>, path: &Path) -> Result<Self, ModError> {
        let source = fs::read_to_string(path)?;
        Self::from_source(name, &source)
    }

    /// The bundled Skirmish rules.
    pub fn skirmish() -> Result<Self, ModError> {
        Self::from_source("Skirmish", SKIRMISH)
    }
}

impl RuleSet for LuaRuleSet {
    fn name(&self) -> &str {
        &self.name
    }

    fn bind(&mut self, game: &mut Game) -> Result<(), RuleSetError> {
        with_game(&self.lua, &self.name, GameAccess::Write(game), |lua, api| {
            let setup: Function = lua.registry_value(&self.setup)?;
            setup.call::<_, ()>(api)
        })
        .map_err(|err| RuleSetError::Script(err.to_string()))
    }

    fn on_event(&mut self, game: &mut Game, event: &GameEvent) -> Result<(), RuleSetError> {
        let Some(key) = self.on_event.as_ref() else {
            return Ok(());
        };
        with_game(&self.lua, &self.name, GameAccess::Write(game), |lua, api| {
            let handler: Function = lua.registry_value(key)?;
            let options = SerializeOptions::new()
                .serialize_none_to_null(false)
                .serialize_unit_to_null(false);
            let event = lua.to_value_with(event, options)?;
            handler.call::<_, ()>((api, event))
        })
        .map_err(|err| RuleSetError::Script(err.to_string()))
    }
}

/// An action registered by a script through `game.add_action`.
struct LuaAction {
    lua: Rc<Lua>,
    mod_name: String,
    name: String,
    allowed: Option<RegistryKey>,
    targets: Option<RegistryKey>,
    perform: RegistryKey,
}

impl LuaAction {
    fn check_allowed(&self, game: &Game) -> bool {
        let Some(key) = self.allowed.as_ref() else {
            return true;
        };
        let result = with_game(&self.lua, &self.mod_name, GameAccess::Read(game), |lua, api| {
            let allowed: Function = lua.registry_value(key)?;
            allowed.call::<_, bool>(api)
        });
        result.unwrap_or_else(|err| {
            warn!(mod_name = %self.mod_name, action = %self.name, error = %err, "allowed check failed");
            false
        })
    }

    fn run(&self, game: &mut Game, target: Option<EntityId>) -> Result<(), ActionError> {
        with_game(&self.lua, &self.mod_name, GameAccess::Write(game), |lua, api| {
            let perform: Function = lua.registry_value(&self.perform)?;
            perform.call::<_, ()>((api, target.map(EntityId::get)))
        })
        .map_err(|err| ActionError::Script(err.to_string()))
    }
}

impl UsableAction for LuaAction {
    fn is_allowed(&self, game: &Game) -> bool {
        self.check_allowed(game)
    }

    fn perform(&self, game: &mut Game) -> Result<(), ActionError> {
        self.run(game, None)
    }
}

impl TargetAction for LuaAction {
    fn is_allowed(&self, game: &Game) -> bool {
        self.check_allowed(game)
    }

    fn find_targets(&self, game: &Game) -> Vec<EntityId> {
        let Some(key) = self.targets.as_ref() else {
            return Vec::new();
        };
        let result = with_game(&self.lua, &self.mod_name, GameAccess::Read(game), |lua, api| {
            let targets: Function = lua.registry_value(key)?;
            targets.call::<_, Option<Vec<u32>>>(api)
        });
        match result {
            Ok(ids) => ids.unwrap_or_default().into_iter().map(EntityId).collect(),
            Err(err) => {
                warn!(mod_name = %self.mod_name, action = %self.name, error = %err, "target query failed");
                Vec::new()
            }
        }
    }

    fn perform_on(&self, game: &mut Game, target: EntityId) -> Result<(), ActionError> {
        self.run(game, Some(target))
    }
}

enum GameAccess<'g> {
    Read(&'g Game),
    Write(&'g mut Game),
}

impl GameAccess<'_> {
    fn game(&self) -> &Game {
        match self {
            Self::Read(game) => game,
            Self::Write(game) => &**game,
        }
    }

    fn game_mut(&mut self) -> mlua::Result<&mut Game> {
        match self {
            Self::Write(game) => Ok(&mut **game),
            Self::Read(_) => Err(mlua::Error::RuntimeError(
                "game is read-only inside allowed and targets".to_string(),
            )),
        }
    }
}

fn runtime_error(err: impl Display) -> ModError {
    ModError::Runtime(err.to_string())
}

fn script_error(err: impl Display) -> mlua::Error {
    mlua::Error::RuntimeError(err.to_string())
}

/// Runs `body` with a `game` table bound to `access` for the duration of the
/// call.
fn with_game<R>(
    handle: &Rc<Lua>,
    mod_name: &str,
    access: GameAccess<'_>,
    body: impl for<'lua> FnOnce(&'lua Lua, Table<'lua>) -> mlua::Result<R>,
) -> mlua::Result<R> {
    let lua: &Lua = handle;
    let cell = RefCell::new(access);
    lua.scope(|scope| {
        let api = build_api(lua, handle, scope, &cell, mod_name)?;
        body(lua, api)
    })
}

fn data_to_lua<'lua>(lua: &'lua Lua, value: &DataValue) -> mlua::Result<Value<'lua>> {
    Ok(match value {
        DataValue::Bool(value) => Value::Boolean(*value),
        DataValue::Int(value) => Value::Integer(*value),
        DataValue::Number(value) => Value::Number(*value),
        DataValue::Text(value) => Value::String(lua.create_string(value)?),
    })
}

fn data_from_lua(value: Value<'_>) -> mlua::Result<Option<DataValue>> {
    Ok(Some(match value {
        Value::Nil => return Ok(None),
        Value::Boolean(value) => DataValue::Bool(value),
        Value::Integer(value) => DataValue::Int(value),
        Value::Number(value) => DataValue::Number(value),
        Value::String(value) => DataValue::Text(value.to_str()?.to_string()),
        other => {
            return Err(mlua::Error::RuntimeError(format!(
                "unsupported metadata value of type {}",
                other.type_name()
            )))
        }
    }))
}

fn build_api<'lua, 'scope, 'g: 'scope>(
    lua: &'lua Lua,
    handle: &Rc<Lua>,
    scope: &Scope<'lua, 'scope>,
    access: &'scope RefCell<GameAccess<'g>>,
    mod_name: &str,
) -> mlua::Result<Table<'lua>> {
    let api = lua.create_table()?;

    // entities and zones
    api.set(
        "add_player",
        scope.create_function(move |_, name: String| {
            let mut access = access.borrow_mut();
            let id = access.game_mut()?.add_player(name).map_err(script_error)?;
            Ok(id.get())
        })?,
    )?;
    api.set(
        "add_zone",
        scope.create_function(
            move |_, (name, owner, visibility): (String, Option<u32>, Option<String>)| {
                let visibility = match visibility {
                    Some(raw) => Visibility::parse(&raw).ok_or_else(|| {
                        mlua::Error::RuntimeError(format!("unknown visibility {}", raw))
                    })?,
                    None => Visibility::Public,
                };
                let mut access = access.borrow_mut();
                let id = access
                    .game_mut()?
                    .add_zone(name, owner.map(EntityId), visibility)
                    .map_err(script_error)?;
                Ok(id.get())
            },
        )?,
    )?;
    api.set(
        "add_card",
        scope.create_function(move |_, (zone, name): (u32, String)| {
            let mut access = access.borrow_mut();
            let id = access
                .game_mut()?
                .add_card(ZoneId(zone), name)
                .map_err(script_error)?;
            Ok(id.get())
        })?,
    )?;
    api.set(
        "move_card",
        scope.create_function(move |_, (card, zone): (u32, u32)| {
            let mut access = access.borrow_mut();
            access
                .game_mut()?
                .move_card(EntityId(card), ZoneId(zone))
                .map_err(script_error)
        })?,
    )?;
    api.set(
        "shuffle",
        scope.create_function(move |_, zone: u32| {
            let mut access = access.borrow_mut();
            access
                .game_mut()?
                .shuffle_zone(ZoneId(zone))
                .map_err(script_error)
        })?,
    )?;
    api.set(
        "players",
        scope.create_function(move |_, ()| {
            let access = access.borrow();
            let ids: Vec<u32> = access.game().player_ids().into_iter().map(EntityId::get).collect();
            Ok(ids)
        })?,
    )?;
    api.set(
        "opponents",
        scope.create_function(move |_, player: u32| {
            let access = access.borrow();
            let ids: Vec<u32> = access
                .game()
                .opponents_of(EntityId(player))
                .into_iter()
                .map(EntityId::get)
                .collect();
            Ok(ids)
        })?,
    )?;
    api.set(
        "cards",
        scope.create_function(move |_, zone: u32| {
            let access = access.borrow();
            let ids: Vec<u32> = access
                .game()
                .cards_in(ZoneId(zone))
                .iter()
                .map(|id| id.get())
                .collect();
            Ok(ids)
        })?,
    )?;
    api.set(
        "zone_named",
        scope.create_function(move |_, (owner, name): (Option<u32>, String)| {
            let access = access.borrow();
            let zone = access.game().zone_named(owner.map(EntityId), &name);
            Ok(zone.map(ZoneId::get))
        })?,
    )?;
    api.set(
        "zone_of",
        scope.create_function(move |_, card: u32| {
            let access = access.borrow();
            let zone = access.game().card(EntityId(card)).map(|card| card.zone());
            Ok(zone.map(ZoneId::get))
        })?,
    )?;
    api.set(
        "owner_of",
        scope.create_function(move |_, entity: u32| {
            let access = access.borrow();
            Ok(access.game().owner_of(EntityId(entity)).map(EntityId::get))
        })?,
    )?;
    api.set(
        "name_of",
        scope.create_function(move |_, entity: u32| {
            let access = access.borrow();
            let game = access.game();
            let id = EntityId(entity);
            Ok(game.targetable(id).map(|entity| entity.name().to_string()))
        })?,
    )?;

    // turn flow
    api.set(
        "current_player",
        scope.create_function(move |_, ()| {
            let access = access.borrow();
            Ok(access.game().current_player().map(EntityId::get))
        })?,
    )?;
    api.set(
        "turn",
        scope.create_function(move |_, ()| Ok(access.borrow().game().turn()))?,
    )?;
    api.set(
        "next_turn",
        scope.create_function(move |_, ()| {
            let mut access = access.borrow_mut();
            let player = access.game_mut()?.next_turn().map_err(script_error)?;
            Ok(player.get())
        })?,
    )?;
    api.set(
        "end_game",
        scope.create_function(move |_, winner: Option<u32>| {
            let mut access = access.borrow_mut();
            access.game_mut()?.end_game(winner.map(EntityId));
            Ok(())
        })?,
    )?;
    api.set(
        "is_game_over",
        scope.create_function(move |_, ()| Ok(access.borrow().game().is_game_over()))?,
    )?;

    // metadata
    api.set(
        "get",
        scope.create_function(move |lua, (entity, key): (u32, String)| {
            let access = access.borrow();
            match access.game().data(EntityId(entity), &key) {
                Some(value) => data_to_lua(lua, value),
                None => Ok(Value::Nil),
            }
        })?,
    )?;
    api.set(
        "set",
        scope.create_function(move |_, (entity, key, value): (u32, String, Value)| {
            let value = data_from_lua(value)?;
            let mut access = access.borrow_mut();
            let game = access.game_mut()?;
            match value {
                Some(value) => game
                    .set_data(EntityId(entity), key, value)
                    .map_err(script_error),
                None => game
                    .remove_data(EntityId(entity), &key)
                    .map(|_| ())
                    .map_err(script_error),
            }
        })?,
    )?;
    api.set(
        "random",
        scope.create_function(move |_, (low, high): (i64, i64)| {
            let mut access = access.borrow_mut();
            Ok(access.game_mut()?.rng_mut().range(low, high))
        })?,
    )?;

    // actions
    let handle = Rc::clone(handle);
    let owner_mod = mod_name.to_string();
    api.set(
        "add_action",
        scope.create_function(move |lua, (owner, name, def): (u32, String, Table)| {
            let perform: Option<Function> = def.get("perform")?;
            let perform = perform.ok_or_else(|| {
                mlua::Error::RuntimeError(format!("action {} needs a perform function", name))
            })?;
            let allowed: Option<Function> = def.get("allowed")?;
            let targets: Option<Function> = def.get("targets")?;
            let is_target = targets.is_some();
            let action = Rc::new(LuaAction {
                lua: Rc::clone(&handle),
                mod_name: owner_mod.clone(),
                name: name.clone(),
                allowed: allowed
                    .map(|func| lua.create_registry_value(func))
                    .transpose()?,
                targets: targets
                    .map(|func| lua.create_registry_value(func))
                    .transpose()?,
                perform: lua.create_registry_value(perform)?,
            });
            let owner = EntityId(owner);
            let action = if is_target {
                Action::from_target(owner, name, action)
            } else {
                Action::from_usable(owner, name, action)
            };
            let mut access = access.borrow_mut();
            access.game_mut()?.add_action(action).map_err(script_error)
        })?,
    )?;

    let log_mod = mod_name.to_string();
    api.set(
        "log",
        scope.create_function(move |_, msg: String| {
            info!(mod_name = %log_mod, "{}", msg);
            Ok(())
        })?,
    )?;

    Ok(api)
}
