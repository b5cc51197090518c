//! Speaker selection and the small random policies that shape each turn.
//!
//! Every function takes the random source as a parameter so callers can seed it.

use crate::error::ChatError;
use crate::persona::PersonaRegistry;
use crate::session::SpeakerUsage;
use rand::seq::SliceRandom;
use rand::Rng;

/// Chance of asking a question after a statement.
pub const QUESTION_AFTER_STATEMENT: f64 = 0.3;
/// Chance of asking a question right after another question.
pub const QUESTION_AFTER_QUESTION: f64 = 0.1;
/// Chance of a decorative reaction after a turn.
pub const REACTION_PROBABILITY: f64 = 0.15;
/// Chance that the opening line is a question.
pub const OPENING_QUESTION_PROBABILITY: f64 = 0.5;

pub const REACTIONS: &[&str] = &["🚀", "💎", "🤔", "👀", "😅", "🤝", "💪", "🎯", "🔥", "⚡️"];

/// Pick who speaks next and count the turn against them.
///
/// Prefers the personas with the fewest turns, never the one who spoke last.
/// When every least-used persona is the last speaker the filter widens to the
/// rest of the pool.
pub fn select_next_speaker<R: Rng + ?Sized>(
    pool: &[String],
    usage: &mut SpeakerUsage,
    last_speaker: Option<&str>,
    rng: &mut R,
) -> Result<String, ChatError> {
    let min = usage.min_over(pool).ok_or(ChatError::EmptyPool)?;
    let not_last = |h: &&String| Some(h.as_str()) != last_speaker;

    let mut eligible: Vec<&String> = pool
        .iter()
        .filter(|h| usage.count(h) == min)
        .filter(not_last)
        .collect();

    if eligible.is_empty() {
        eligible = pool.iter().filter(not_last).collect();
    }

    let chosen = eligible
        .choose(rng)
        .map(|h| (*h).clone())
        .ok_or_else(|| ChatError::NoEligibleSpeaker {
            last: last_speaker.unwrap_or_default().to_string(),
        })?;

    usage.increment(&chosen);
    Ok(chosen)
}

/// Should the next reply end in a question?
pub fn should_ask_question<R: Rng + ?Sized>(prev_is_question: bool, rng: &mut R) -> bool {
    let p = if prev_is_question {
        QUESTION_AFTER_QUESTION
    } else {
        QUESTION_AFTER_STATEMENT
    };
    rng.gen_bool(p)
}

/// A reaction symbol to show beside the turn, if one is drawn.
pub fn maybe_reaction<R: Rng + ?Sized>(rng: &mut R) -> Option<&'static str> {
    if rng.gen_bool(REACTION_PROBABILITY) {
        REACTIONS.choose(rng).copied()
    } else {
        None
    }
}

/// The scripted first line of a discussion and whether it is a question.
pub fn opening_line<R: Rng + ?Sized>(topic: &str, rng: &mut R) -> (String, bool) {
    if rng.gen_bool(OPENING_QUESTION_PROBABILITY) {
        (format!("what's up with {}?", topic), true)
    } else {
        (format!("checking out {}", topic), false)
    }
}

/// Shuffle the roster and keep between `min` and `max` personas (inclusive).
pub fn pick_participants<R: Rng + ?Sized>(
    registry: &PersonaRegistry,
    min: usize,
    max: usize,
    rng: &mut R,
) -> Vec<String> {
    let mut handles = registry.handles();
    handles.shuffle(rng);
    let max = max.max(min).min(handles.len());
    let min = min.min(max);
    let count = rng.gen_range(min..=max);
    handles.truncate(count);
    handles
}

/// Number of generated turns for one bounded discussion, uniform in `[min, max]`.
pub fn turn_budget<R: Rng + ?Sized>(min: usize, max: usize, rng: &mut R) -> usize {
    rng.gen_range(min..=max.max(min))
}
