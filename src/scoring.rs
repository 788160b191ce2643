//! Scoring systems: compositions of [`ScoreBlock`]s into the full match hierarchy, raw
//! score validation, and the static registry of supported variants.

use crate::block::ScoreBlock;
use crate::dual::Scalar;
use crate::point;
use std::fmt::{Display, Formatter};
use strum_macros::{Display, EnumIter, EnumString};
use thiserror::Error;

/// Width of the normalised score encoding: two sets plus an optional match tie-break,
/// zero-padded when absent.
pub const SCORE_ELEMENTS: usize = 6;

/// A normalised score.
pub type Score = [u16; SCORE_ELEMENTS];

/// The registry of supported scoring systems. Variants differ only in the game's
/// advantage policy; parsing a variant from its serialised name is the entire lookup
/// mechanism.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
pub enum Variant {
    /// Games allow one advantage round, then a sudden-death point.
    #[strum(serialize = "single_advantage")]
    SingleAdvantage,

    /// Games extend through unlimited deuces.
    #[strum(serialize = "classic_advantage")]
    ClassicAdvantage,
}
impl Variant {
    pub fn system(&self) -> ScoringSystem {
        let game = match self {
            Variant::SingleAdvantage => ScoreBlock::new(4, Some(1)),
            Variant::ClassicAdvantage => ScoreBlock::new(4, None),
        };
        ScoringSystem::new(game)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    A,
    B,
}
impl Side {
    fn of_pair(a: i64, b: i64) -> Side {
        if a > b {
            Side::A
        } else {
            Side::B
        }
    }
}

impl Display for Side {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::A => write!(f, "A"),
            Side::B => write!(f, "B"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidScore {
    #[error("a score holds 4 or 6 elements, not {0}")]
    Width(usize),

    #[error("no set can end {0}-{1}")]
    Set(i64, i64),

    #[error("no match tie-break can end {0}-{1}")]
    TieBreak(i64, i64),

    #[error("sets and tie-break do not form a decided match")]
    Undecided,
}

/// A raw score that passed validation: its fixed-width normalised form and the winning
/// side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckedScore {
    pub normalized: Score,
    pub winner: Side,
}

/// One scoring-system variant: the block hierarchy point → game → set → match. A set is
/// raced in games with the set tie-break as its decisive unit; the match is raced in sets
/// with the match tie-break as its decisive unit.
#[derive(Clone, Debug)]
pub struct ScoringSystem {
    game: ScoreBlock,
    set_tie_break: ScoreBlock,
    set: ScoreBlock,
    match_tie_break: ScoreBlock,
    match_block: ScoreBlock,
}
impl ScoringSystem {
    fn new(game: ScoreBlock) -> Self {
        Self {
            game,
            set_tie_break: ScoreBlock::new(7, Some(0)),
            set: ScoreBlock::new(6, Some(1)),
            match_tie_break: ScoreBlock::new(10, Some(0)),
            match_block: ScoreBlock::new(2, Some(0)),
        }
    }

    /// Validates a raw 4- or 6-element score, returning its normalised form and winner. A
    /// 4-element score is taken to have skipped the match tie-break and is padded with
    /// `[0, 0]`; the caller's slice is never touched.
    pub fn check_score(&self, raw: &[i64]) -> Result<CheckedScore, InvalidScore> {
        let padded: [i64; SCORE_ELEMENTS] = match raw.len() {
            4 => [raw[0], raw[1], raw[2], raw[3], 0, 0],
            SCORE_ELEMENTS => raw.try_into().unwrap(),
            width => return Err(InvalidScore::Width(width)),
        };

        let set_1 = classify_set(padded[0], padded[1]).ok_or(InvalidScore::Set(padded[0], padded[1]))?;
        let set_2 = classify_set(padded[2], padded[3]).ok_or(InvalidScore::Set(padded[2], padded[3]))?;
        let tie_break = classify_tie_break(padded[4], padded[5])
            .ok_or(InvalidScore::TieBreak(padded[4], padded[5]))?;

        let winner = match (set_1, set_2, tie_break) {
            (Side::A, Side::A, None) => Side::A,
            (Side::B, Side::B, None) => Side::B,
            (set_1, set_2, Some(decider)) if set_1 != set_2 => decider,
            _ => return Err(InvalidScore::Undecided),
        };
        Ok(CheckedScore {
            normalized: padded.map(|element| element as u16),
            winner,
        })
    }

    /// Probability of an exact normalised score: the product of both set probabilities
    /// (each raced in games, decided by the set tie-break) and the match tie-break
    /// probability (raced in points).
    pub fn score_probability<S: Scalar>(&self, score: &Score, abilities: &[S]) -> S {
        let p_point = point::win_probability(abilities);
        let p_game = self.game.win_probability(p_point, p_point);
        let p_set_tie_break = self.set_tie_break.win_probability(p_point, p_point);
        self.set
            .score_probability(score[0], score[1], p_game, p_set_tie_break)
            * self
                .set
                .score_probability(score[2], score[3], p_game, p_set_tie_break)
            * self
                .match_tie_break
                .score_probability(score[4], score[5], p_point, p_point)
    }

    /// Aggregate probability that side A wins the match.
    pub fn win_probability<S: Scalar>(&self, abilities: &[S]) -> S {
        let p_point = point::win_probability(abilities);
        let p_game = self.game.win_probability(p_point, p_point);
        let p_set_tie_break = self.set_tie_break.win_probability(p_point, p_point);
        let p_set = self.set.win_probability(p_game, p_set_tie_break);
        let p_match_tie_break = self.match_tie_break.win_probability(p_point, p_point);
        self.match_block.win_probability(p_set, p_match_tie_break)
    }
}

fn classify_set(a: i64, b: i64) -> Option<Side> {
    let (min, max) = (a.min(b), a.max(b));
    if min < 0 || !(6..=7).contains(&max) {
        return None;
    }
    if max == 6 && min > 4 {
        return None;
    }
    if max == 7 && !(5..=6).contains(&min) {
        return None;
    }
    Some(Side::of_pair(a, b))
}

fn classify_tie_break(a: i64, b: i64) -> Option<Option<Side>> {
    if a == 0 && b == 0 {
        return Some(None);
    }
    let (min, max) = (a.min(b), a.max(b));
    if min < 0 || max < 10 || max > u16::MAX as i64 {
        return None;
    }
    if max == 10 && min > 8 {
        return None;
    }
    if max > 10 && min != max - 2 {
        return None;
    }
    Some(Some(Side::of_pair(a, b)))
}
