//! Match import: the seam between tabular source data and the likelihood core. A source
//! row carries the match date, the scoring system, the players on each side and the raw
//! score; import validates the score, interns the players and derives a recency weight.
//! Rows that fail validation are logged and skipped, never fatal.

use crate::csv::CsvReader;
use crate::likelihood::PlayerSlots;
use crate::lookup::Lookup;
use crate::scoring::{Score, Side, Variant};
use anyhow::Context;
use chrono::NaiveDate;
use std::path::Path;
use std::str::FromStr;
use tracing::warn;

/// Half-life of the recency decay applied to match weights, in days.
pub const DEFAULT_HALF_LIFE: f64 = 240.0;

const COLUMNS: usize = 8;

/// One admitted match, in the exact shape the loss accepts.
#[derive(Clone, Debug, PartialEq)]
pub struct MatchRecord {
    pub scoring_system: Variant,
    pub normalized_score: Score,
    pub players: PlayerSlots,
    pub weight: f64,
    pub winner: Side,
    pub date: NaiveDate,
}

/// The outcome of an import.
#[derive(Debug)]
pub struct ImportedMatches {
    pub records: Vec<MatchRecord>,
    pub players: Lookup<String>,
    pub skipped: usize,
}

/// Reads matches from a CSV file with the columns
/// `date,tournament,scoring_system,player_a1,player_a2,player_b1,player_b2,score`. The
/// second player of a side is left blank for singles. Weights decay with a half-life of
/// `half_life_days`, anchored on the most recent admitted match.
pub fn read_matches(
    path: impl AsRef<Path>,
    half_life_days: f64,
) -> Result<ImportedMatches, anyhow::Error> {
    let path = path.as_ref();
    let reader =
        CsvReader::open(path).with_context(|| format!("cannot open {}", path.display()))?;

    let mut players = Lookup::new();
    let mut records = vec![];
    let mut skipped = 0;
    for (line, row) in reader.enumerate() {
        let row = row?;
        if line == 0 && row.first().map(String::as_str) == Some("date") {
            continue;
        }
        match admit_row(&row, &mut players) {
            Ok(record) => records.push(record),
            Err(reason) => {
                warn!("skipping line {}: {reason}", line + 1);
                skipped += 1;
            }
        }
    }

    if let Some(latest) = records.iter().map(|record| record.date).max() {
        for record in &mut records {
            let elapsed_days = (latest - record.date).num_days() as f64;
            record.weight = 2f64.powf(-elapsed_days / half_life_days);
        }
    }

    Ok(ImportedMatches {
        records,
        players,
        skipped,
    })
}

fn admit_row(row: &[String], players: &mut Lookup<String>) -> Result<MatchRecord, String> {
    if row.len() != COLUMNS {
        return Err(format!("expected {COLUMNS} columns, found {}", row.len()));
    }
    let date = NaiveDate::parse_from_str(&row[0], "%Y-%m-%d")
        .map_err(|_| format!("unparseable date '{}'", row[0]))?;
    let scoring_system =
        Variant::from_str(&row[2]).map_err(|_| format!("unknown scoring system '{}'", row[2]))?;

    let raw_score = parse_score(&row[7])?;
    let checked = scoring_system
        .system()
        .check_score(&raw_score)
        .map_err(|invalid| format!("score '{}' rejected: {invalid}", row[7]))?;

    // interning comes last so that rejected rows leave no phantom players behind
    let slots = team_slots([&row[3], &row[4], &row[5], &row[6]], players)?;

    Ok(MatchRecord {
        scoring_system,
        normalized_score: checked.normalized,
        players: slots,
        weight: 1.0,
        winner: checked.winner,
        date,
    })
}

/// Interns the four player-name cells into index slots. A blank second cell on both sides
/// makes a singles match, duplicating each side's player; a blank on only one side is
/// malformed.
fn team_slots(names: [&String; 4], players: &mut Lookup<String>) -> Result<PlayerSlots, String> {
    let [a1, a2, b1, b2] = names;
    if a1.is_empty() || b1.is_empty() {
        return Err("a side is missing its first player".into());
    }
    match (a2.is_empty(), b2.is_empty()) {
        (true, true) => {
            let a = players.intern(a1.clone());
            let b = players.intern(b1.clone());
            Ok([a, a, b, b])
        }
        (false, false) => Ok([
            players.intern(a1.clone()),
            players.intern(a2.clone()),
            players.intern(b1.clone()),
            players.intern(b2.clone()),
        ]),
        _ => Err("one side fields a pair, the other a single player".into()),
    }
}

/// Parses a score string such as `"6-3 4-6 11-9"` into its flat integer form.
pub fn parse_score(score: &str) -> Result<Vec<i64>, String> {
    let mut elements = vec![];
    for pair in score.split_whitespace() {
        for element in pair.split('-') {
            let element: i64 = element
                .parse()
                .map_err(|_| format!("unparseable score '{score}'"))?;
            elements.push(element);
        }
    }
    Ok(elements)
}
