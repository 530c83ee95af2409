//! Native two-player creature battler, always available in the registry.

use crate::{
    Action, ActionError, EntityId, Game, GameError, GameEvent, RuleSet, RuleSetError, Visibility,
    ZoneId,
};

const CREATURES: &[&str] = &[
    "Goblin", "Wolf", "Knight", "Archer", "Troll", "Wisp", "Golem", "Drake",
];

pub const DECK: &str = "Deck";
pub const HAND: &str = "Hand";
pub const BATTLEFIELD: &str = "Battlefield";
pub const DISCARD: &str = "Discard";

#[derive(Debug, Clone)]
pub struct VanillaConfig {
    pub players: Vec<String>,
    pub starting_life: i64,
    pub deck_size: usize,
    pub opening_hand: usize,
    pub mana_cap: i64,
    pub max_attack: i64,
    pub max_health: i64,
}

impl Default for VanillaConfig {
    fn default() -> Self {
        Self {
            players: vec!["Player 1".to_string(), "Player 2".to_string()],
            starting_life: 10,
            deck_size: 20,
            opening_hand: 3,
            mana_cap: 10,
            max_attack: 5,
            max_health: 5,
        }
    }
}

#[derive(Debug, Default)]
pub struct VanillaRules {
    config: VanillaConfig,
}

impl VanillaRules {
    pub fn new(config: VanillaConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &VanillaConfig {
        &self.config
    }
}

impl RuleSet for VanillaRules {
    fn name(&self) -> &str {
        "Vanilla"
    }

    fn bind(&mut self, game: &mut Game) -> Result<(), RuleSetError> {
        if self.config.players.len() < 2 {
            return Err(RuleSetError::Invalid("vanilla needs two players".to_string()));
        }
        let mut players = Vec::new();
        for name in &self.config.players {
            let player = game.add_player(name.clone())?;
            game.set_data(player, "life", self.config.starting_life)?;
            game.set_data(player, "mana", 0i64)?;
            game.set_data(player, "max_mana", 0i64)?;
            players.push(player);
        }
        for &player in &players {
            let deck = game.add_zone(DECK, Some(player), Visibility::Hidden)?;
            game.add_zone(HAND, Some(player), Visibility::Owner)?;
            game.add_zone(BATTLEFIELD, Some(player), Visibility::Public)?;
            game.add_zone(DISCARD, Some(player), Visibility::Public)?;
            for _ in 0..self.config.deck_size {
                let card = self.create_creature(game, deck)?;
                add_card_actions(game, card, player)?;
            }
            game.add_action(end_turn(player))?;
        }
        for &player in &players {
            for _ in 0..self.config.opening_hand {
                draw(game, player)?;
            }
        }
        Ok(())
    }

    fn on_event(&mut self, game: &mut Game, event: &GameEvent) -> Result<(), RuleSetError> {
        if let GameEvent::TurnStarted { player, .. } = *event {
            let max_mana = (game.data_int(player, "max_mana") + 1).min(self.config.mana_cap);
            game.set_data(player, "max_mana", max_mana)?;
            game.set_data(player, "mana", max_mana)?;
            if let Some(field) = game.zone_named(Some(player), BATTLEFIELD) {
                for card in game.cards_in(field).to_vec() {
                    game.set_data(card, "sick", false)?;
                }
            }
            draw(game, player)?;
        }
        Ok(())
    }
}

impl VanillaRules {
    fn create_creature(&self, game: &mut Game, deck: ZoneId) -> Result<EntityId, GameError> {
        let rng = game.rng_mut();
        let name = CREATURES[rng.index(CREATURES.len()).unwrap_or(0)];
        let attack = rng.range(1, self.config.max_attack);
        let health = rng.range(1, self.config.max_health);
        let cost = ((attack + health) / 2).max(1);
        let card = game.add_card(deck, name)?;
        game.set_data(card, "attack", attack)?;
        game.set_data(card, "health", health)?;
        game.set_data(card, "cost", cost)?;
        game.set_data(card, "sick", true)?;
        Ok(card)
    }
}

trait DataExt {
    fn data_int(&self, id: EntityId, key: &str) -> i64;
}

impl DataExt for Game {
    fn data_int(&self, id: EntityId, key: &str) -> i64 {
        self.metadata(id).map_or(0, |table| table.int(key))
    }
}

fn in_zone(game: &Game, card: EntityId, owner: EntityId, zone: &str) -> bool {
    match (game.card(card), game.zone_named(Some(owner), zone)) {
        (Some(card), Some(zone)) => card.zone() == zone,
        _ => false,
    }
}

fn is_turn_of(game: &Game, player: EntityId) -> bool {
    !game.is_game_over() && game.current_player() == Some(player)
}

/// Moves the top card of the deck into the hand; an empty deck draws nothing.
pub fn draw(game: &mut Game, player: EntityId) -> Result<Option<EntityId>, GameError> {
    let deck = game
        .zone_named(Some(player), DECK)
        .ok_or(GameError::NotAPlayer(player))?;
    let hand = game
        .zone_named(Some(player), HAND)
        .ok_or(GameError::NotAPlayer(player))?;
    let Some(card) = game.cards_in(deck).first().copied() else {
        return Ok(None);
    };
    game.move_card(card, hand)?;
    Ok(Some(card))
}

fn end_turn(player: EntityId) -> Action {
    Action::usable(
        player,
        "End Turn",
        move |game| is_turn_of(game, player),
        |game| {
            game.next_turn()?;
            Ok(())
        },
    )
}

fn add_card_actions(game: &mut Game, card: EntityId, owner: EntityId) -> Result<(), GameError> {
    game.add_action(Action::usable(
        card,
        "Play",
        move |game| {
            is_turn_of(game, owner)
                && in_zone(game, card, owner, HAND)
                && game.data_int(owner, "mana") >= game.data_int(card, "cost")
        },
        move |game| play(game, card, owner),
    ))?;
    game.add_action(Action::targeted(
        card,
        "Attack",
        move |game| {
            is_turn_of(game, owner)
                && in_zone(game, card, owner, BATTLEFIELD)
                && !game.metadata(card).map_or(true, |table| table.flag("sick"))
                && game.data_int(card, "attack") > 0
        },
        move |game| attack_targets(game, owner),
        move |game, target| attack(game, card, owner, target),
    ))?;
    Ok(())
}

fn play(game: &mut Game, card: EntityId, owner: EntityId) -> Result<(), ActionError> {
    let field = game
        .zone_named(Some(owner), BATTLEFIELD)
        .ok_or(GameError::NotAPlayer(owner))?;
    let mana = game.data_int(owner, "mana") - game.data_int(card, "cost");
    if mana < 0 {
        return Err(ActionError::Rejected("not enough mana".to_string()));
    }
    game.set_data(owner, "mana", mana)?;
    game.move_card(card, field)?;
    game.set_data(card, "sick", true)?;
    Ok(())
}

fn attack_targets(game: &Game, owner: EntityId) -> Vec<EntityId> {
    let mut targets = Vec::new();
    for opponent in game.opponents_of(owner) {
        targets.push(opponent);
        if let Some(field) = game.zone_named(Some(opponent), BATTLEFIELD) {
            targets.extend_from_slice(game.cards_in(field));
        }
    }
    targets
}

fn attack(
    game: &mut Game,
    card: EntityId,
    owner: EntityId,
    target: EntityId,
) -> Result<(), ActionError> {
    let power = game.data_int(card, "attack");
    if game.player(target).is_some() {
        let life = game.data_int(target, "life") - power;
        game.set_data(target, "life", life)?;
        if life <= 0 {
            game.end_game(Some(owner));
        }
    } else {
        let defender = game
            .owner_of(target)
            .ok_or(GameError::UnknownEntity(target))?;
        let counter = game.data_int(target, "attack");
        let target_health = game.data_int(target, "health") - power;
        let own_health = game.data_int(card, "health") - counter;
        game.set_data(target, "health", target_health)?;
        game.set_data(card, "health", own_health)?;
        if target_health <= 0 {
            destroy(game, target, defender)?;
        }
        if own_health <= 0 {
            destroy(game, card, owner)?;
        }
    }
    game.set_data(card, "sick", true)?;
    Ok(())
}

fn destroy(game: &mut Game, card: EntityId, owner: EntityId) -> Result<(), GameError> {
    let discard = game
        .zone_named(Some(owner), DISCARD)
        .ok_or(GameError::NotAPlayer(owner))?;
    game.move_card(card, discard)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bound() -> (Game, VanillaRules) {
        let mut game = Game::new(11);
        let mut rules = VanillaRules::default();
        rules.bind(&mut game).expect("bind");
        (game, rules)
    }

    fn start(game: &mut Game, rules: &mut VanillaRules) {
        game.start().expect("start");
        for event in game.take_events() {
            rules.on_event(game, &event).expect("event");
        }
        game.take_events();
    }

    #[test]
    fn bind_builds_zones_and_opening_hands() {
        let (game, rules) = bound();
        let config = rules.config();
        assert_eq!(game.players().len(), 2);
        assert_eq!(game.zones().len(), 8);
        for player in game.player_ids() {
            let deck = game.zone_named(Some(player), DECK).expect("deck");
            let hand = game.zone_named(Some(player), HAND).expect("hand");
            assert_eq!(game.cards_in(hand).len(), config.opening_hand);
            assert_eq!(
                game.cards_in(deck).len(),
                config.deck_size - config.opening_hand
            );
            assert_eq!(game.data_int(player, "life"), config.starting_life);
        }
    }

    #[test]
    fn turn_start_refreshes_mana_and_draws() {
        let (mut game, mut rules) = bound();
        start(&mut game, &mut rules);
        let first = game.player_ids()[0];
        let hand = game.zone_named(Some(first), HAND).expect("hand");
        assert_eq!(game.data_int(first, "mana"), 1);
        assert_eq!(game.cards_in(hand).len(), 4);
    }

    #[test]
    fn playing_a_card_spends_mana() {
        let (mut game, mut rules) = bound();
        start(&mut game, &mut rules);
        let first = game.player_ids()[0];
        let hand = game.zone_named(Some(first), HAND).expect("hand");
        let field = game.zone_named(Some(first), BATTLEFIELD).expect("field");
        let card = game.cards_in(hand)[0];
        game.set_data(card, "cost", 1i64).expect("cost");
        play(&mut game, card, first).expect("play");
        assert_eq!(game.data_int(first, "mana"), 0);
        assert_eq!(game.cards_in(field), &[card]);
    }

    #[test]
    fn lethal_attack_ends_the_game() {
        let (mut game, mut rules) = bound();
        start(&mut game, &mut rules);
        let ids = game.player_ids();
        let (first, second) = (ids[0], ids[1]);
        let hand = game.zone_named(Some(first), HAND).expect("hand");
        let card = game.cards_in(hand)[0];
        game.set_data(card, "attack", 50i64).expect("attack");
        attack(&mut game, card, first, second).expect("attack");
        assert!(game.is_game_over());
        assert_eq!(game.winner(), Some(first));
    }

    #[test]
    fn trading_creatures_sends_both_to_discard() {
        let (mut game, _) = bound();
        let ids = game.player_ids();
        let (first, second) = (ids[0], ids[1]);
        let mine = game.cards_in(game.zone_named(Some(first), HAND).expect("hand"))[0];
        let theirs = game.cards_in(game.zone_named(Some(second), HAND).expect("hand"))[0];
        for card in [mine, theirs] {
            game.set_data(card, "attack", 3i64).expect("attack");
            game.set_data(card, "health", 2i64).expect("health");
        }
        attack(&mut game, mine, first, theirs).expect("attack");
        let discard = |player| game.zone_named(Some(player), DISCARD).expect("discard");
        assert_eq!(game.cards_in(discard(first)), &[mine]);
        assert_eq!(game.cards_in(discard(second)), &[theirs]);
    }
}
