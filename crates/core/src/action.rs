use crate::{EntityId, Game, GameError};
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("game error: {0}")]
    Game(#[from] GameError),
    #[error("script error: {0}")]
    Script(String),
    #[error("rejected: {0}")]
    Rejected(String),
}

/// An action that can be performed without choosing a target.
pub trait UsableAction {
    fn is_allowed(&self, game: &Game) -> bool;

    /// Must apply its whole effect or fail without having changed `game`.
    fn perform(&self, game: &mut Game) -> Result<(), ActionError>;
}

/// An action that needs a target picked from [`TargetAction::find_targets`].
pub trait TargetAction {
    fn is_allowed(&self, game: &Game) -> bool;

    fn find_targets(&self, game: &Game) -> Vec<EntityId>;

    fn perform_on(&self, game: &mut Game, target: EntityId) -> Result<(), ActionError>;
}

#[derive(Clone)]
pub enum ActionKind {
    Usable(Rc<dyn UsableAction>),
    Target(Rc<dyn TargetAction>),
}

/// A named action attached to a player or a card.
#[derive(Clone)]
pub struct Action {
    owner: EntityId,
    name: String,
    kind: ActionKind,
}

impl Action {
    pub fn from_usable(
        owner: EntityId,
        name: impl Into<String>,
        action: Rc<dyn UsableAction>,
    ) -> Self {
        Self {
            owner,
            name: name.into(),
            kind: ActionKind::Usable(action),
        }
    }

    pub fn from_target(
        owner: EntityId,
        name: impl Into<String>,
        action: Rc<dyn TargetAction>,
    ) -> Self {
        Self {
            owner,
            name: name.into(),
            kind: ActionKind::Target(action),
        }
    }

    /// Closure-backed usable action, mostly for native rule-sets.
    pub fn usable<A, P>(owner: EntityId, name: impl Into<String>, allowed: A, perform: P) -> Self
    where
        A: Fn(&Game) -> bool + 'static,
        P: Fn(&mut Game) -> Result<(), ActionError> + 'static,
    {
        Self::from_usable(owner, name, Rc::new(FnAction { allowed, perform }))
    }

    /// Closure-backed target action.
    pub fn targeted<A, T, P>(
        owner: EntityId,
        name: impl Into<String>,
        allowed: A,
        targets: T,
        perform: P,
    ) -> Self
    where
        A: Fn(&Game) -> bool + 'static,
        T: Fn(&Game) -> Vec<EntityId> + 'static,
        P: Fn(&mut Game, EntityId) -> Result<(), ActionError> + 'static,
    {
        Self::from_target(
            owner,
            name,
            Rc::new(FnTargetAction {
                allowed,
                targets,
                perform,
            }),
        )
    }

    pub fn owner(&self) -> EntityId {
        self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &ActionKind {
        &self.kind
    }

    pub fn is_target(&self) -> bool {
        matches!(self.kind, ActionKind::Target(_))
    }

    pub fn is_allowed(&self, game: &Game) -> bool {
        match &self.kind {
            ActionKind::Usable(action) => action.is_allowed(game),
            ActionKind::Target(action) => action.is_allowed(game),
        }
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("owner", &self.owner)
            .field("name", &self.name)
            .field("target", &self.is_target())
            .finish()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_target() {
            write!(f, "{} {} (targeted)", self.owner, self.name)
        } else {
            write!(f, "{} {}", self.owner, self.name)
        }
    }
}

struct FnAction<A, P> {
    allowed: A,
    perform: P,
}

impl<A, P> UsableAction for FnAction<A, P>
where
    A: Fn(&Game) -> bool,
    P: Fn(&mut Game) -> Result<(), ActionError>,
{
    fn is_allowed(&self, game: &Game) -> bool {
        (self.allowed)(game)
    }

    fn perform(&self, game: &mut Game) -> Result<(), ActionError> {
        (self.perform)(game)
    }
}

struct FnTargetAction<A, T, P> {
    allowed: A,
    targets: T,
    perform: P,
}

impl<A, T, P> TargetAction for FnTargetAction<A, T, P>
where
    A: Fn(&Game) -> bool,
    T: Fn(&Game) -> Vec<EntityId>,
    P: Fn(&mut Game, EntityId) -> Result<(), ActionError>,
{
    fn is_allowed(&self, game: &Game) -> bool {
        (self.allowed)(game)
    }

    fn find_targets(&self, game: &Game) -> Vec<EntityId> {
        (self.targets)(game)
    }

    fn perform_on(&self, game: &mut Game, target: EntityId) -> Result<(), ActionError> {
        (self.perform)(game, target)
    }
}

/// Actions of one entity, keyed by name in insertion order.
#[derive(Clone, Default)]
pub struct ActionSet {
    actions: Vec<Action>,
}

impl ActionSet {
    /// Replaces an action with the same name in place.
    pub fn insert(&mut self, action: Action) {
        match self.actions.iter_mut().find(|item| item.name == action.name) {
            Some(slot) => *slot = action,
            None => self.actions.push(action),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Action> + '_ {
        self.actions.iter()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl fmt::Debug for ActionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.actions.iter().map(|action| action.name()))
            .finish()
    }
}
