use crate::{
    Action, DispatchError, Dispatcher, EntityId, Game, GameEvent, Performed, RuleSet,
    RuleSetError, TableIter, TargetResolver,
};
use tracing::{debug, warn};

const MAX_EVENT_ROUNDS: usize = 64;

/// One game bound to the rule-set that drives it.
pub struct Session {
    game: Game,
    ruleset: Box<dyn RuleSet>,
    dispatcher: Dispatcher,
    history: Vec<GameEvent>,
}

impl Session {
    pub fn new(mut ruleset: Box<dyn RuleSet>, seed: u64) -> Result<Self, RuleSetError> {
        let mut game = Game::new(seed);
        ruleset.bind(&mut game)?;
        debug!(ruleset = ruleset.name(), seed, "rule-set bound");
        Ok(Self {
            game,
            ruleset,
            dispatcher: Dispatcher::new(),
            history: Vec::new(),
        })
    }

    pub fn start(&mut self) -> Result<(), RuleSetError> {
        self.game.start()?;
        self.pump_events();
        Ok(())
    }

    pub fn game(&self) -> &Game {
        &self.game
    }

    pub fn ruleset(&self) -> &dyn RuleSet {
        self.ruleset.as_ref()
    }

    pub fn history(&self) -> &[GameEvent] {
        &self.history
    }

    pub fn performed(&self) -> u64 {
        self.dispatcher.performed()
    }

    pub fn is_game_over(&self) -> bool {
        self.game.is_game_over()
    }

    pub fn list_actions(&self) -> Vec<Action> {
        self.dispatcher.list_actions(&self.game)
    }

    pub fn dispatch(
        &mut self,
        listed: &[Action],
        index: usize,
        resolver: &mut dyn TargetResolver,
    ) -> Result<Performed, DispatchError> {
        let performed = self
            .dispatcher
            .dispatch(&mut self.game, listed, index, resolver)?;
        self.pump_events();
        Ok(performed)
    }

    pub fn dispatch_input(
        &mut self,
        listed: &[Action],
        input: &str,
        resolver: &mut dyn TargetResolver,
    ) -> Result<Option<Performed>, DispatchError> {
        let performed = self
            .dispatcher
            .dispatch_input(&mut self.game, listed, input, resolver)?;
        if performed.is_some() {
            self.pump_events();
        }
        Ok(performed)
    }

    pub fn expose_table(&self, entity: EntityId) -> Option<TableIter<'_>> {
        self.ruleset.expose_table(&self.game, entity)
    }

    /// Hands queued events to the rule-set. Events raised by the handlers are
    /// delivered in later rounds, up to a fixed limit. Each handler runs on a
    /// staged copy that replaces the game only when the handler succeeds.
    fn pump_events(&mut self) {
        for _ in 0..MAX_EVENT_ROUNDS {
            let events = self.game.take_events();
            if events.is_empty() {
                return;
            }
            for event in events {
                let mut staged = self.game.clone();
                match self.ruleset.on_event(&mut staged, &event) {
                    Ok(()) => self.game = staged,
                    Err(err) => {
                        warn!(ruleset = self.ruleset.name(), ?event, error = %err, "event handler failed")
                    }
                }
                self.history.push(event);
            }
        }
        let dropped = self.game.take_events();
        if !dropped.is_empty() {
            warn!(count = dropped.len(), "event rounds exhausted, dropping events");
            self.history.extend(dropped);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter {
        seen: usize,
    }

    impl RuleSet for Counter {
        fn name(&self) -> &str {
            "Counter"
        }

        fn bind(&mut self, game: &mut Game) -> Result<(), RuleSetError> {
            let player = game.add_player("Solo")?;
            game.add_action(Action::usable(
                player,
                "Pass",
                |_| true,
                |game| {
                    game.next_turn()?;
                    Ok(())
                },
            ))?;
            Ok(())
        }

        fn on_event(&mut self, game: &mut Game, event: &GameEvent) -> Result<(), RuleSetError> {
            self.seen += 1;
            if let GameEvent::TurnStarted { player, turn } = event {
                game.set_data(*player, "turn", i64::from(*turn))?;
            }
            Ok(())
        }
    }

    /// Writes to the player table, then fails.
    struct Bankrupt;

    impl RuleSet for Bankrupt {
        fn name(&self) -> &str {
            "Bankrupt"
        }

        fn bind(&mut self, game: &mut Game) -> Result<(), RuleSetError> {
            let player = game.add_player("Solo")?;
            game.set_data(player, "gold", 10i64)?;
            Ok(())
        }

        fn on_event(&mut self, game: &mut Game, event: &GameEvent) -> Result<(), RuleSetError> {
            if let GameEvent::TurnStarted { player, .. } = event {
                game.set_data(*player, "gold", 0i64)?;
                game.end_game(None);
                return Err(RuleSetError::Script("bank offline".to_string()));
            }
            Ok(())
        }
    }

    #[test]
    fn failing_handler_leaves_no_partial_state() {
        let mut session = Session::new(Box::new(Bankrupt), 3).expect("session");
        session.start().expect("start");
        assert_eq!(session.game().players()[0].data.int("gold"), 10);
        assert!(!session.is_game_over());
        assert!(!session
            .history()
            .iter()
            .any(|event| matches!(event, GameEvent::GameEnded { .. })));
        assert_eq!(session.history().len(), 2);
    }

    #[test]
    fn start_delivers_opening_events() {
        let mut session = Session::new(Box::new(Counter { seen: 0 }), 3).expect("session");
        session.start().expect("start");
        assert_eq!(
            session.history(),
            &[
                GameEvent::GameStarted,
                GameEvent::TurnStarted {
                    player: EntityId(1),
                    turn: 1
                }
            ]
        );
        let table: Vec<_> = session.expose_table(EntityId(1)).expect("table").collect();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn dispatch_records_action_and_follow_up_events() {
        let mut session = Session::new(Box::new(Counter { seen: 0 }), 3).expect("session");
        session.start().expect("start");
        let actions = session.list_actions();
        let mut no_target = |_: &Game, _: &Action, _: &[EntityId]| -> Option<usize> { None };
        session
            .dispatch(&actions, 0, &mut no_target)
            .expect("dispatch");
        assert_eq!(session.performed(), 1);
        assert_eq!(session.game().turn(), 2);
        assert_eq!(session.game().players()[0].data.int("turn"), 2);
        assert!(matches!(
            session.history().last(),
            Some(GameEvent::ActionPerformed { action, .. }) if action == "Pass"
        ));
    }
}
