use crate::{EntityId, ZoneId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    GameStarted,
    TurnStarted {
        player: EntityId,
        turn: u32,
    },
    ActionPerformed {
        owner: EntityId,
        action: String,
        target: Option<EntityId>,
    },
    CardMoved {
        card: EntityId,
        from: ZoneId,
        to: ZoneId,
    },
    GameEnded {
        winner: Option<EntityId>,
    },
}

#[derive(Debug, Clone, Default)]
pub struct EventBus {
    queue: Vec<GameEvent>,
}

impl EventBus {
    pub fn push(&mut self, event: GameEvent) {
        self.queue.push(event);
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GameEvent> + '_ {
        self.queue.iter()
    }

    pub fn drain(&mut self) -> impl Iterator<Item = GameEvent> + '_ {
        self.queue.drain(..)
    }
}
