use crate::{
    Action, ActionSet, DataValue, EntityId, EntityKind, EventBus, GameEvent, Metadata, RngState,
    Targetable, ZoneId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GameError {
    #[error("unknown entity {0}")]
    UnknownEntity(EntityId),
    #[error("unknown zone {0}")]
    UnknownZone(ZoneId),
    #[error("entity {0} is not a player")]
    NotAPlayer(EntityId),
    #[error("entity {0} is not a card")]
    NotACard(EntityId),
    #[error("players cannot join a game that has started")]
    AlreadyStarted,
    #[error("game has no players")]
    NoPlayers,
    #[error("game is over")]
    GameOver,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Public,
    Owner,
    Hidden,
}

impl Visibility {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "public" => Some(Self::Public),
            "owner" | "private" => Some(Self::Owner),
            "hidden" | "secret" => Some(Self::Hidden),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Player {
    id: EntityId,
    name: String,
    pub actions: ActionSet,
    pub data: Metadata,
}

impl Player {
    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Targetable for Player {
    fn entity_id(&self) -> EntityId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn actions(&self) -> &ActionSet {
        &self.actions
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Player {} {}", self.id, self.name)
    }
}

#[derive(Debug, Clone)]
pub struct Zone {
    id: ZoneId,
    name: String,
    owner: Option<EntityId>,
    visibility: Visibility,
    cards: Vec<EntityId>,
}

impl Zone {
    pub fn id(&self) -> ZoneId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> Option<EntityId> {
        self.owner
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    /// Index 0 is the top of the zone.
    pub fn cards(&self) -> &[EntityId] {
        &self.cards
    }

    pub fn is_known_to_player(&self, player: EntityId) -> bool {
        match self.visibility {
            Visibility::Public => true,
            Visibility::Owner => self.owner == Some(player),
            Visibility::Hidden => false,
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.owner {
            Some(owner) => write!(
                f,
                "Zone {} {} of {} ({} cards)",
                self.id,
                self.name,
                owner,
                self.cards.len()
            ),
            None => write!(f, "Zone {} {} ({} cards)", self.id, self.name, self.cards.len()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Card {
    id: EntityId,
    name: String,
    zone: ZoneId,
    pub actions: ActionSet,
    pub data: Metadata,
}

impl Card {
    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn zone(&self) -> ZoneId {
        self.zone
    }
}

impl Targetable for Card {
    fn entity_id(&self) -> EntityId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn actions(&self) -> &ActionSet {
        &self.actions
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Card {} {}", self.id, self.name)
    }
}

/// One state change, for backends that cannot hold a reference to the game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum GameCommand {
    AddPlayer {
        name: String,
    },
    AddZone {
        name: String,
        #[serde(default)]
        owner: Option<EntityId>,
        #[serde(default)]
        visibility: Visibility,
    },
    AddCard {
        zone: ZoneId,
        name: String,
    },
    MoveCard {
        card: EntityId,
        zone: ZoneId,
    },
    SetData {
        entity: EntityId,
        key: String,
        value: DataValue,
    },
    RemoveData {
        entity: EntityId,
        key: String,
    },
    NextTurn,
    EndGame {
        #[serde(default)]
        winner: Option<EntityId>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameView {
    pub turn: u32,
    pub current_player: Option<EntityId>,
    pub game_over: bool,
    pub winner: Option<EntityId>,
    pub players: Vec<PlayerView>,
    pub zones: Vec<ZoneView>,
    pub cards: Vec<CardView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerView {
    pub id: EntityId,
    pub name: String,
    pub data: Metadata,
    pub actions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneView {
    pub id: ZoneId,
    pub name: String,
    pub owner: Option<EntityId>,
    pub visibility: Visibility,
    pub cards: Vec<EntityId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardView {
    pub id: EntityId,
    pub name: String,
    pub zone: ZoneId,
    pub data: Metadata,
    pub actions: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Game {
    players: Vec<Player>,
    zones: Vec<Zone>,
    cards: BTreeMap<EntityId, Card>,
    next_entity: u32,
    current: Option<usize>,
    turn: u32,
    started: bool,
    game_over: bool,
    winner: Option<EntityId>,
    rng: RngState,
    events: EventBus,
}

impl Game {
    pub fn new(seed: u64) -> Self {
        Self {
            players: Vec::new(),
            zones: Vec::new(),
            cards: BTreeMap::new(),
            next_entity: 1,
            current: None,
            turn: 0,
            started: false,
            game_over: false,
            winner: None,
            rng: RngState::from_seed(seed),
            events: EventBus::default(),
        }
    }

    fn allocate_entity(&mut self) -> EntityId {
        let id = EntityId(self.next_entity);
        self.next_entity += 1;
        id
    }

    pub fn add_player(&mut self, name: impl Into<String>) -> Result<EntityId, GameError> {
        if self.started {
            return Err(GameError::AlreadyStarted);
        }
        let id = self.allocate_entity();
        self.players.push(Player {
            id,
            name: name.into(),
            actions: ActionSet::default(),
            data: Metadata::new(),
        });
        Ok(id)
    }

    pub fn add_zone(
        &mut self,
        name: impl Into<String>,
        owner: Option<EntityId>,
        visibility: Visibility,
    ) -> Result<ZoneId, GameError> {
        if let Some(owner) = owner {
            self.player(owner).ok_or(GameError::NotAPlayer(owner))?;
        }
        let id = ZoneId(self.zones.len() as u32 + 1);
        self.zones.push(Zone {
            id,
            name: name.into(),
            owner,
            visibility,
            cards: Vec::new(),
        });
        Ok(id)
    }

    /// Places the new card at the bottom of `zone`.
    pub fn add_card(&mut self, zone: ZoneId, name: impl Into<String>) -> Result<EntityId, GameError> {
        self.zone(zone).ok_or(GameError::UnknownZone(zone))?;
        let id = self.allocate_entity();
        self.cards.insert(
            id,
            Card {
                id,
                name: name.into(),
                zone,
                actions: ActionSet::default(),
                data: Metadata::new(),
            },
        );
        self.zone_slot(zone)?.cards.push(id);
        Ok(id)
    }

    /// Moves a card to the bottom of `to`.
    pub fn move_card(&mut self, card: EntityId, to: ZoneId) -> Result<(), GameError> {
        self.zone(to).ok_or(GameError::UnknownZone(to))?;
        let from = self.card(card).ok_or(GameError::NotACard(card))?.zone;
        self.zone_slot(from)?.cards.retain(|id| *id != card);
        self.zone_slot(to)?.cards.push(card);
        if let Some(entry) = self.cards.get_mut(&card) {
            entry.zone = to;
        }
        self.events.push(GameEvent::CardMoved { card, from, to });
        Ok(())
    }

    pub fn shuffle_zone(&mut self, zone: ZoneId) -> Result<(), GameError> {
        let index = self.zone_index(zone)?;
        let mut cards = std::mem::take(&mut self.zones[index].cards);
        self.rng.shuffle(&mut cards);
        self.zones[index].cards = cards;
        Ok(())
    }

    fn zone_index(&self, zone: ZoneId) -> Result<usize, GameError> {
        self.zones
            .iter()
            .position(|item| item.id == zone)
            .ok_or(GameError::UnknownZone(zone))
    }

    fn zone_slot(&mut self, zone: ZoneId) -> Result<&mut Zone, GameError> {
        let index = self.zone_index(zone)?;
        Ok(&mut self.zones[index])
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player_ids(&self) -> Vec<EntityId> {
        self.players.iter().map(|player| player.id).collect()
    }

    pub fn player(&self, id: EntityId) -> Option<&Player> {
        self.players.iter().find(|player| player.id == id)
    }

    pub fn player_mut(&mut self, id: EntityId) -> Option<&mut Player> {
        self.players.iter_mut().find(|player| player.id == id)
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    pub fn zone(&self, id: ZoneId) -> Option<&Zone> {
        self.zones.iter().find(|zone| zone.id == id)
    }

    pub fn zone_named(&self, owner: Option<EntityId>, name: &str) -> Option<ZoneId> {
        self.zones
            .iter()
            .find(|zone| zone.owner == owner && zone.name == name)
            .map(|zone| zone.id)
    }

    pub fn card(&self, id: EntityId) -> Option<&Card> {
        self.cards.get(&id)
    }

    pub fn card_mut(&mut self, id: EntityId) -> Option<&mut Card> {
        self.cards.get_mut(&id)
    }

    pub fn cards_in(&self, zone: ZoneId) -> &[EntityId] {
        self.zone(zone).map(Zone::cards).unwrap_or(&[])
    }

    pub fn targetable(&self, id: EntityId) -> Option<&dyn Targetable> {
        match self.player(id) {
            Some(player) => Some(player as &dyn Targetable),
            None => self.card(id).map(|card| card as &dyn Targetable),
        }
    }

    pub fn kind_of(&self, id: EntityId) -> Option<EntityKind> {
        if self.player(id).is_some() {
            Some(EntityKind::Player)
        } else if self.cards.contains_key(&id) {
            Some(EntityKind::Card)
        } else {
            None
        }
    }

    /// A player owns itself; a card belongs to the owner of its zone.
    pub fn owner_of(&self, id: EntityId) -> Option<EntityId> {
        if self.player(id).is_some() {
            return Some(id);
        }
        let card = self.card(id)?;
        self.zone(card.zone)?.owner
    }

    pub fn opponents_of(&self, player: EntityId) -> Vec<EntityId> {
        self.players
            .iter()
            .map(|item| item.id)
            .filter(|id| *id != player)
            .collect()
    }

    pub fn metadata(&self, id: EntityId) -> Option<&Metadata> {
        if let Some(player) = self.player(id) {
            return Some(&player.data);
        }
        self.card(id).map(|card| &card.data)
    }

    pub fn metadata_mut(&mut self, id: EntityId) -> Option<&mut Metadata> {
        if let Some(index) = self.players.iter().position(|player| player.id == id) {
            return Some(&mut self.players[index].data);
        }
        self.cards.get_mut(&id).map(|card| &mut card.data)
    }

    pub fn data(&self, id: EntityId, key: &str) -> Option<&DataValue> {
        self.metadata(id)?.get(key)
    }

    pub fn set_data(
        &mut self,
        id: EntityId,
        key: impl Into<String>,
        value: impl Into<DataValue>,
    ) -> Result<(), GameError> {
        self.metadata_mut(id)
            .ok_or(GameError::UnknownEntity(id))?
            .set(key, value);
        Ok(())
    }

    pub fn remove_data(&mut self, id: EntityId, key: &str) -> Result<Option<DataValue>, GameError> {
        Ok(self
            .metadata_mut(id)
            .ok_or(GameError::UnknownEntity(id))?
            .remove(key))
    }

    pub fn actions_of(&self, id: EntityId) -> Option<&ActionSet> {
        if let Some(player) = self.player(id) {
            return Some(&player.actions);
        }
        self.card(id).map(|card| &card.actions)
    }

    pub fn add_action(&mut self, action: Action) -> Result<(), GameError> {
        let owner = action.owner();
        if let Some(player) = self.player_mut(owner) {
            player.actions.insert(action);
            return Ok(());
        }
        let card = self
            .cards
            .get_mut(&owner)
            .ok_or(GameError::UnknownEntity(owner))?;
        card.actions.insert(action);
        Ok(())
    }

    /// Player actions first, then card actions zone by zone.
    pub fn all_actions(&self) -> Vec<Action> {
        let mut actions: Vec<Action> = self
            .players
            .iter()
            .flat_map(|player| player.actions.iter().cloned())
            .collect();
        for zone in &self.zones {
            for id in &zone.cards {
                if let Some(card) = self.cards.get(id) {
                    actions.extend(card.actions.iter().cloned());
                }
            }
        }
        actions
    }

    pub fn current_player(&self) -> Option<EntityId> {
        self.current.map(|index| self.players[index].id)
    }

    pub fn turn(&self) -> u32 {
        self.turn
    }

    pub fn start(&mut self) -> Result<(), GameError> {
        if self.started {
            return Ok(());
        }
        let first = self.players.first().ok_or(GameError::NoPlayers)?.id;
        self.started = true;
        self.current = Some(0);
        self.turn = 1;
        self.events.push(GameEvent::GameStarted);
        self.events.push(GameEvent::TurnStarted {
            player: first,
            turn: self.turn,
        });
        Ok(())
    }

    pub fn next_turn(&mut self) -> Result<EntityId, GameError> {
        if self.game_over {
            return Err(GameError::GameOver);
        }
        if self.players.is_empty() {
            return Err(GameError::NoPlayers);
        }
        let next = self.current.map_or(0, |index| (index + 1) % self.players.len());
        self.current = Some(next);
        self.turn += 1;
        let player = self.players[next].id;
        self.events.push(GameEvent::TurnStarted {
            player,
            turn: self.turn,
        });
        Ok(player)
    }

    /// Ending is permanent; later calls keep the first winner.
    pub fn end_game(&mut self, winner: Option<EntityId>) {
        if self.game_over {
            return;
        }
        self.game_over = true;
        self.winner = winner;
        self.events.push(GameEvent::GameEnded { winner });
    }

    pub fn is_game_over(&self) -> bool {
        self.game_over
    }

    pub fn winner(&self) -> Option<EntityId> {
        self.winner
    }

    pub fn rng_mut(&mut self) -> &mut RngState {
        &mut self.rng
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    pub fn take_events(&mut self) -> Vec<GameEvent> {
        self.events.drain().collect()
    }

    pub fn apply(&mut self, command: GameCommand) -> Result<(), GameError> {
        match command {
            GameCommand::AddPlayer { name } => {
                self.add_player(name)?;
            }
            GameCommand::AddZone {
                name,
                owner,
                visibility,
            } => {
                self.add_zone(name, owner, visibility)?;
            }
            GameCommand::AddCard { zone, name } => {
                self.add_card(zone, name)?;
            }
            GameCommand::MoveCard { card, zone } => self.move_card(card, zone)?,
            GameCommand::SetData { entity, key, value } => self.set_data(entity, key, value)?,
            GameCommand::RemoveData { entity, key } => {
                self.remove_data(entity, &key)?;
            }
            GameCommand::NextTurn => {
                self.next_turn()?;
            }
            GameCommand::EndGame { winner } => self.end_game(winner),
        }
        Ok(())
    }

    /// Applies every command or none of them.
    pub fn apply_all(&mut self, commands: Vec<GameCommand>) -> Result<(), GameError> {
        let mut staged = self.clone();
        for command in commands {
            staged.apply(command)?;
        }
        *self = staged;
        Ok(())
    }

    pub fn view(&self) -> GameView {
        let action_names = |set: &ActionSet| set.iter().map(|a| a.name().to_string()).collect();
        GameView {
            turn: self.turn,
            current_player: self.current_player(),
            game_over: self.game_over,
            winner: self.winner,
            players: self
                .players
                .iter()
                .map(|player| PlayerView {
                    id: player.id,
                    name: player.name.clone(),
                    data: player.data.clone(),
                    actions: action_names(&player.actions),
                })
                .collect(),
            zones: self
                .zones
                .iter()
                .map(|zone| ZoneView {
                    id: zone.id,
                    name: zone.name.clone(),
                    owner: zone.owner,
                    visibility: zone.visibility,
                    cards: zone.cards.clone(),
                })
                .collect(),
            cards: self
                .cards
                .values()
                .map(|card| CardView {
                    id: card.id,
                    name: card.name.clone(),
                    zone: card.zone,
                    data: card.data.clone(),
                    actions: action_names(&card.actions),
                })
                .collect(),
        }
    }
}

impl fmt::Display for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Game turn {}", self.turn)?;
        if let Some(player) = self.current.map(|index| &self.players[index]) {
            write!(f, ", current player {}", player.name)?;
        }
        if self.game_over {
            f.write_str(", game over")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_player_game() -> (Game, EntityId, EntityId, ZoneId) {
        let mut game = Game::new(7);
        let alice = game.add_player("Alice").expect("alice");
        let bob = game.add_player("Bob").expect("bob");
        let hand = game
            .add_zone("Hand", Some(alice), Visibility::Owner)
            .expect("zone");
        (game, alice, bob, hand)
    }

    #[test]
    fn players_and_cards_share_entity_ids() {
        let (mut game, alice, bob, hand) = two_player_game();
        let card = game.add_card(hand, "Goblin").expect("card");
        assert_eq!(alice, EntityId(1));
        assert_eq!(bob, EntityId(2));
        assert_eq!(card, EntityId(3));
        assert_eq!(game.kind_of(card), Some(EntityKind::Card));
        assert_eq!(game.owner_of(card), Some(alice));
    }

    #[test]
    fn targetable_covers_players_and_cards() {
        let (mut game, alice, _, hand) = two_player_game();
        let card = game.add_card(hand, "Goblin").expect("card");
        game.add_action(Action::usable(card, "Play", |_| true, |_| Ok(())))
            .expect("action");

        let player = game.targetable(alice).expect("player");
        assert_eq!(player.entity_id(), alice);
        assert_eq!(player.name(), "Alice");
        assert!(player.actions().is_empty());

        let goblin = game.targetable(card).expect("card");
        assert_eq!(goblin.entity_id(), card);
        assert_eq!(goblin.to_string(), "Card #3 Goblin");
        assert_eq!(goblin.actions().len(), 1);

        assert!(game.targetable(EntityId(99)).is_none());
    }

    #[test]
    fn zone_visibility_rules() {
        let (mut game, alice, bob, hand) = two_player_game();
        let field = game.add_zone("Field", None, Visibility::Public).expect("field");
        let deck = game
            .add_zone("Deck", Some(alice), Visibility::Hidden)
            .expect("deck");
        assert!(game.zone(hand).expect("hand").is_known_to_player(alice));
        assert!(!game.zone(hand).expect("hand").is_known_to_player(bob));
        assert!(game.zone(field).expect("field").is_known_to_player(bob));
        assert!(!game.zone(deck).expect("deck").is_known_to_player(alice));
    }

    #[test]
    fn move_card_keeps_single_zone_membership() {
        let (mut game, alice, _, hand) = two_player_game();
        let field = game.add_zone("Field", Some(alice), Visibility::Public).expect("field");
        let card = game.add_card(hand, "Goblin").expect("card");
        game.move_card(card, field).expect("move");
        assert!(game.cards_in(hand).is_empty());
        assert_eq!(game.cards_in(field), &[card]);
        assert_eq!(game.card(card).expect("card").zone(), field);
        assert!(game
            .events()
            .iter()
            .any(|event| matches!(event, GameEvent::CardMoved { to, .. } if *to == field)));
    }

    #[test]
    fn game_over_never_clears() {
        let (mut game, alice, bob, _) = two_player_game();
        game.start().expect("start");
        game.end_game(Some(alice));
        game.end_game(Some(bob));
        assert!(game.is_game_over());
        assert_eq!(game.winner(), Some(alice));
        assert!(matches!(game.next_turn(), Err(GameError::GameOver)));
        assert!(game.is_game_over());
    }

    #[test]
    fn players_are_fixed_once_started() {
        let (mut game, _, _, _) = two_player_game();
        game.start().expect("start");
        assert!(matches!(game.add_player("Late"), Err(GameError::AlreadyStarted)));
    }

    #[test]
    fn turns_rotate_through_players() {
        let (mut game, alice, bob, _) = two_player_game();
        game.start().expect("start");
        assert_eq!(game.current_player(), Some(alice));
        assert_eq!(game.next_turn().expect("turn"), bob);
        assert_eq!(game.next_turn().expect("turn"), alice);
        assert_eq!(game.turn(), 3);
    }

    #[test]
    fn apply_all_is_atomic() {
        let (mut game, alice, _, _) = two_player_game();
        let commands = vec![
            GameCommand::SetData {
                entity: alice,
                key: "life".to_string(),
                value: DataValue::Int(3),
            },
            GameCommand::MoveCard {
                card: EntityId(99),
                zone: ZoneId(1),
            },
        ];
        assert!(game.apply_all(commands).is_err());
        assert!(game.data(alice, "life").is_none());
    }

    #[test]
    fn commands_parse_from_json() {
        let raw = r#"[
            {"op":"add_player","name":"Carol"},
            {"op":"add_zone","name":"Pile"},
            {"op":"set_data","entity":1,"key":"life","value":5},
            {"op":"end_game"}
        ]"#;
        let commands: Vec<GameCommand> = serde_json::from_str(raw).expect("parse");
        assert_eq!(
            commands[1],
            GameCommand::AddZone {
                name: "Pile".to_string(),
                owner: None,
                visibility: Visibility::Public,
            }
        );
        let mut game = Game::new(1);
        game.apply_all(commands).expect("apply");
        assert_eq!(game.players()[0].name(), "Carol");
        assert_eq!(game.data(EntityId(1), "life"), Some(&DataValue::Int(5)));
        assert!(game.is_game_over());
    }
}
