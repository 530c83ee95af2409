use crate::{Action, EntityId, Game, RngState, TargetResolver};
use std::cell::RefCell;

/// Computer player choosing from the same lists a human is shown.
pub trait AiStrategy {
    fn name(&self) -> &str;

    fn pick_action(&self, game: &Game, actions: &[Action]) -> Option<usize>;

    fn pick_target(&self, game: &Game, action: &Action, targets: &[EntityId]) -> Option<usize>;
}

/// "Loser": always takes the first option.
#[derive(Debug, Default)]
pub struct FirstChoiceAi;

impl AiStrategy for FirstChoiceAi {
    fn name(&self) -> &str {
        "Loser"
    }

    fn pick_action(&self, _game: &Game, actions: &[Action]) -> Option<usize> {
        if actions.is_empty() {
            None
        } else {
            Some(0)
        }
    }

    fn pick_target(&self, _game: &Game, _action: &Action, targets: &[EntityId]) -> Option<usize> {
        if targets.is_empty() {
            None
        } else {
            Some(0)
        }
    }
}

/// "Idiot": uniformly random choices from a seeded source.
#[derive(Debug)]
pub struct RandomAi {
    rng: RefCell<RngState>,
}

impl RandomAi {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: RefCell::new(RngState::from_seed(seed)),
        }
    }
}

impl AiStrategy for RandomAi {
    fn name(&self) -> &str {
        "Idiot"
    }

    fn pick_action(&self, _game: &Game, actions: &[Action]) -> Option<usize> {
        self.rng.borrow_mut().index(actions.len())
    }

    fn pick_target(&self, _game: &Game, _action: &Action, targets: &[EntityId]) -> Option<usize> {
        self.rng.borrow_mut().index(targets.len())
    }
}

/// Lets an AI answer target prompts of the dispatcher.
pub struct AiResolver<'a> {
    ai: &'a dyn AiStrategy,
}

impl<'a> AiResolver<'a> {
    pub fn new(ai: &'a dyn AiStrategy) -> Self {
        Self { ai }
    }
}

impl TargetResolver for AiResolver<'_> {
    fn resolve(&mut self, game: &Game, action: &Action, targets: &[EntityId]) -> Option<usize> {
        self.ai.pick_target(game, action, targets)
    }
}
