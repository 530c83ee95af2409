//! Action selection and execution.
//!
//! One dispatch cycle validates the chosen index, re-checks the allowed
//! predicate, resolves a target for target actions and finally performs the
//! action against a staged copy of the game. Any rejection leaves the game
//! untouched.

use crate::{Action, ActionError, ActionKind, EntityId, Game, GameEvent};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Illegal action index: {0}")]
    InvalidInput(String),
    #[error("Action index out of range: {index}")]
    ActionOutOfRange { index: usize, len: usize },
    #[error("Action is not allowed")]
    NotAllowed,
    #[error("No available targets for action")]
    NoTargets,
    #[error("Illegal target index")]
    InvalidTargetInput,
    #[error("Target index out of range: {index}")]
    TargetOutOfRange { index: usize, len: usize },
    #[error("Game over!")]
    GameOver,
    #[error("Action failed: {0}")]
    Failed(#[from] ActionError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    Index(usize),
    Stop,
}

/// Reads one front-end answer: a non-negative index or `exit`.
pub fn parse_choice(input: &str) -> Result<Choice, DispatchError> {
    let trimmed = input.trim();
    if trimmed.eq_ignore_ascii_case("exit") {
        return Ok(Choice::Stop);
    }
    trimmed
        .parse::<usize>()
        .map(Choice::Index)
        .map_err(|_| DispatchError::InvalidInput(trimmed.to_string()))
}

/// Picks one of the freshly discovered targets; `None` means the answer was
/// unreadable.
pub trait TargetResolver {
    fn resolve(&mut self, game: &Game, action: &Action, targets: &[EntityId]) -> Option<usize>;
}

impl<F> TargetResolver for F
where
    F: FnMut(&Game, &Action, &[EntityId]) -> Option<usize>,
{
    fn resolve(&mut self, game: &Game, action: &Action, targets: &[EntityId]) -> Option<usize> {
        self(game, action, targets)
    }
}

#[derive(Debug, Clone)]
pub struct Performed {
    pub action: Action,
    pub target: Option<EntityId>,
}

#[derive(Debug, Default)]
pub struct Dispatcher {
    performed: u64,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of dispatches that reached a successful perform.
    pub fn performed(&self) -> u64 {
        self.performed
    }

    /// Currently allowed actions; empty once the game is over.
    pub fn list_actions(&self, game: &Game) -> Vec<Action> {
        if game.is_game_over() {
            return Vec::new();
        }
        game.all_actions()
            .into_iter()
            .filter(|action| action.is_allowed(game))
            .collect()
    }

    pub fn dispatch(
        &mut self,
        game: &mut Game,
        listed: &[Action],
        index: usize,
        resolver: &mut dyn TargetResolver,
    ) -> Result<Performed, DispatchError> {
        if game.is_game_over() {
            return Err(DispatchError::GameOver);
        }
        let action = listed
            .get(index)
            .ok_or(DispatchError::ActionOutOfRange {
                index,
                len: listed.len(),
            })?;
        if !action.is_allowed(game) {
            debug!(action = %action, "action no longer allowed");
            return Err(DispatchError::NotAllowed);
        }

        let target = match action.kind() {
            ActionKind::Usable(_) => None,
            ActionKind::Target(target_action) => {
                let targets = target_action.find_targets(game);
                if targets.is_empty() {
                    debug!(action = %action, "no targets");
                    return Err(DispatchError::NoTargets);
                }
                let chosen = resolver
                    .resolve(game, action, &targets)
                    .ok_or(DispatchError::InvalidTargetInput)?;
                let target = targets
                    .get(chosen)
                    .copied()
                    .ok_or(DispatchError::TargetOutOfRange {
                        index: chosen,
                        len: targets.len(),
                    })?;
                Some(target)
            }
        };

        let mut staged = game.clone();
        match (action.kind(), target) {
            (ActionKind::Target(target_action), Some(target)) => {
                target_action.perform_on(&mut staged, target)?
            }
            (ActionKind::Usable(usable), _) => usable.perform(&mut staged)?,
            (ActionKind::Target(_), None) => return Err(DispatchError::NoTargets),
        }
        staged.events_mut().push(GameEvent::ActionPerformed {
            owner: action.owner(),
            action: action.name().to_string(),
            target,
        });
        *game = staged;
        self.performed += 1;
        debug!(action = %action, ?target, "action performed");
        Ok(Performed {
            action: action.clone(),
            target,
        })
    }

    /// Parses raw input and dispatches it; `Ok(None)` means the player asked to
    /// stop.
    pub fn dispatch_input(
        &mut self,
        game: &mut Game,
        listed: &[Action],
        input: &str,
        resolver: &mut dyn TargetResolver,
    ) -> Result<Option<Performed>, DispatchError> {
        match parse_choice(input)? {
            Choice::Stop => Ok(None),
            Choice::Index(index) => self.dispatch(game, listed, index, resolver).map(Some),
        }
    }
}
