use crate::{EntityId, Game, GameError, GameEvent, TableIter};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleSetError {
    #[error("game error: {0}")]
    Game(#[from] GameError),
    #[error("script error: {0}")]
    Script(String),
    #[error("invalid rule-set: {0}")]
    Invalid(String),
}

/// Rules of one game, supplied natively or by a script backend.
///
/// The core drives every implementation through this trait alone and never
/// asks which backend produced it.
pub trait RuleSet {
    fn name(&self) -> &str;

    /// Populates a fresh game with players, zones, cards and actions.
    fn bind(&mut self, game: &mut Game) -> Result<(), RuleSetError>;

    /// Reacts to one event after the change that produced it was committed.
    fn on_event(&mut self, _game: &mut Game, _event: &GameEvent) -> Result<(), RuleSetError> {
        Ok(())
    }

    /// Key/value pairs attached to `entity`, in insertion order.
    fn expose_table<'g>(&self, game: &'g Game, entity: EntityId) -> Option<TableIter<'g>> {
        game.metadata(entity).map(|table| table.iter())
    }
}

impl std::fmt::Debug for dyn RuleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleSet").field("name", &self.name()).finish()
    }
}
