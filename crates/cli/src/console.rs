//! Line-oriented console front-end.
//!
//! Every round prints the full state as seen by the viewing player, lists the
//! allowed actions and reads one answer. Target actions follow up with a
//! target prompt. Rejected answers are reported and the round repeats.

use cardshifter_core::{
    parse_choice, Action, AiResolver, AiStrategy, Choice, EntityId, Game, Session, Targetable,
    Visibility,
};
use std::io::{self, BufRead, Write};
use tracing::{debug, warn};

const RULE: &str = "------------------";
const END_RULE: &str = "--------------------------------------------";
const MAX_AI_FAILURES: usize = 32;

pub struct ConsoleController<R, W> {
    session: Session,
    input: R,
    output: W,
    ai: Option<Box<dyn AiStrategy>>,
}

impl<R: BufRead, W: Write> ConsoleController<R, W> {
    pub fn new(session: Session, input: R, output: W) -> Self {
        Self {
            session,
            input,
            output,
            ai: None,
        }
    }

    /// Hands every player except the first to `ai`.
    pub fn with_ai(mut self, ai: Box<dyn AiStrategy>) -> Self {
        self.ai = Some(ai);
        self
    }

    /// Runs rounds until the game ends, input runs dry or the player types
    /// `exit`.
    pub fn play(&mut self) -> io::Result<()> {
        let mut ai_failures = 0;
        while !self.session.is_game_over() {
            if self.is_ai_turn() {
                if self.ai_step()? {
                    ai_failures = 0;
                } else {
                    ai_failures += 1;
                    if ai_failures >= MAX_AI_FAILURES {
                        warn!("ai could not find a playable action, stopping");
                        break;
                    }
                }
                continue;
            }

            self.output_game_state()?;
            let actions = self.session.list_actions();
            self.output_list(&actions)?;
            let Some(line) = read_line(&mut self.input)? else {
                debug!("input closed");
                break;
            };
            if matches!(parse_choice(&line), Ok(Choice::Stop)) {
                break;
            }
            self.handle_action_input(&actions, &line)?;
        }

        writeln!(self.output, "{}", END_RULE)?;
        self.output_game_state()?;
        writeln!(self.output, "Game over!")?;
        self.output.flush()
    }

    fn handle_action_input(&mut self, actions: &[Action], line: &str) -> io::Result<()> {
        writeln!(self.output, "Choose an action:")?;
        if let Ok(Choice::Index(index)) = parse_choice(line) {
            if let Some(action) = actions.get(index) {
                writeln!(self.output, "Action {}", action)?;
            }
        }

        let Self {
            session,
            input,
            output,
            ..
        } = self;
        let mut prompt = |game: &Game, _: &Action, targets: &[EntityId]| -> Option<usize> {
            prompt_target(game, targets, &mut *input, &mut *output)
        };
        let result = session.dispatch_input(actions, line, &mut prompt);
        match result {
            Ok(Some(_)) => writeln!(output, "Action performed"),
            Ok(None) => Ok(()),
            Err(err) => writeln!(output, "{}", err),
        }
    }

    fn is_ai_turn(&self) -> bool {
        let Some(current) = self.session.game().current_player() else {
            return false;
        };
        self.ai.is_some() && Some(current) != self.first_player()
    }

    /// One AI move; `false` when the AI had nothing it could play.
    fn ai_step(&mut self) -> io::Result<bool> {
        let Some(ai) = self.ai.as_deref() else {
            return Ok(false);
        };
        let actions = self.session.list_actions();
        let Some(index) = ai.pick_action(self.session.game(), &actions) else {
            return Ok(false);
        };
        let mut resolver = AiResolver::new(ai);
        match self.session.dispatch(&actions, index, &mut resolver) {
            Ok(performed) => {
                writeln!(self.output, "{} plays {}", ai.name(), performed.action)?;
                Ok(true)
            }
            Err(err) => {
                debug!(ai = ai.name(), error = %err, "ai choice rejected");
                Ok(false)
            }
        }
    }

    fn first_player(&self) -> Option<EntityId> {
        self.session.game().players().first().map(|player| player.id())
    }

    /// With an AI seated the human always watches from the first seat.
    fn viewer(&self) -> Option<EntityId> {
        if self.ai.is_some() {
            self.first_player()
        } else {
            self.session.game().current_player()
        }
    }

    fn output_list(&mut self, actions: &[Action]) -> io::Result<()> {
        writeln!(self.output, "{}", RULE)?;
        for (index, action) in actions.iter().enumerate() {
            writeln!(self.output, "{}: {}", index, action)?;
        }
        Ok(())
    }

    fn output_game_state(&mut self) -> io::Result<()> {
        let viewer = self.viewer();
        let session = &self.session;
        let out = &mut self.output;
        let game = session.game();

        writeln!(out, "{}", RULE)?;
        writeln!(out, "{}", game)?;
        for player in game.players() {
            writeln!(out, "{}", player)?;
            output_entity(session, out, player, 4)?;
        }
        for zone in game.zones() {
            writeln!(out, "{}", zone)?;
            let known = match viewer {
                Some(player) => zone.is_known_to_player(player),
                None => zone.visibility() == Visibility::Public,
            };
            if !known {
                continue;
            }
            for &id in zone.cards() {
                if let Some(card) = game.card(id) {
                    writeln!(out, "    {}", card)?;
                    output_entity(session, out, card, 8)?;
                }
            }
        }
        Ok(())
    }
}

fn output_entity<W: Write>(
    session: &Session,
    out: &mut W,
    entity: &dyn Targetable,
    indent: usize,
) -> io::Result<()> {
    let pad = " ".repeat(indent);
    for action in entity.actions().iter() {
        writeln!(out, "{}Action: {}", pad, action.name())?;
    }
    if let Some(table) = session.expose_table(entity.entity_id()) {
        for (key, value) in table {
            writeln!(out, "{}{}: {}", pad, key, value)?;
        }
    }
    Ok(())
}

fn prompt_target<R: BufRead, W: Write>(
    game: &Game,
    targets: &[EntityId],
    input: &mut R,
    output: &mut W,
) -> Option<usize> {
    let shown = (|| -> io::Result<()> {
        writeln!(output, "{}", RULE)?;
        for (index, &target) in targets.iter().enumerate() {
            writeln!(output, "{}: {}", index, describe(game, target))?;
        }
        writeln!(output, "Enter target index:")
    })();
    if let Err(err) = shown {
        warn!(error = %err, "failed to show target prompt");
        return None;
    }
    match read_line(input) {
        Ok(Some(line)) => line.parse().ok(),
        Ok(None) => None,
        Err(err) => {
            warn!(error = %err, "failed to read target index");
            None
        }
    }
}

fn describe(game: &Game, id: EntityId) -> String {
    game.targetable(id)
        .map_or_else(|| id.to_string(), |entity| entity.to_string())
}

/// Next trimmed line, `None` at end of input.
fn read_line<R: BufRead>(input: &mut R) -> io::Result<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}
