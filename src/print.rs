use stanza::style::{HAlign, Header, MinWidth, Styles};
use stanza::table::{Col, Row, Table};

use crate::fit::FitOutcome;

/// One printable line of the rating table.
#[derive(Debug, Clone, PartialEq)]
pub struct RatingRow {
    pub rank: u32,
    pub player: String,
    pub ability: f64,
    pub matches: usize,
    pub last_played: String,
}

pub fn tabulate_ratings(rows: &[RatingRow]) -> Table {
    let mut table = Table::default()
        .with_cols(vec![
            Col::new(Styles::default().with(MinWidth(6)).with(HAlign::Right)),
            Col::new(Styles::default().with(MinWidth(20)).with(HAlign::Left)),
            Col::new(Styles::default().with(MinWidth(10)).with(HAlign::Right)),
            Col::new(Styles::default().with(MinWidth(9)).with(HAlign::Right)),
            Col::new(Styles::default().with(MinWidth(13)).with(HAlign::Right)),
        ])
        .with_row(Row::new(
            Styles::default().with(Header(true)),
            vec![
                "Rank".into(),
                "Player".into(),
                "Ability".into(),
                "Matches".into(),
                "Last played".into(),
            ],
        ));
    for row in rows {
        table.push_row(Row::new(
            Styles::default(),
            vec![
                format!("{}", row.rank).into(),
                row.player.clone().into(),
                format!("{:.2}", row.ability).into(),
                format!("{}", row.matches).into(),
                row.last_played.clone().into(),
            ],
        ));
    }
    table
}

pub fn tabulate_fit_summary(outcome: &FitOutcome) -> Table {
    let mut table = Table::default()
        .with_cols(vec![
            Col::new(Styles::default().with(MinWidth(12)).with(HAlign::Right)),
            Col::new(Styles::default().with(MinWidth(14)).with(HAlign::Right)),
        ])
        .with_row(Row::new(
            Styles::default().with(Header(true)),
            vec!["Iteration".into(), "Loss".into()],
        ));
    let step = (outcome.trace.len() / 10).max(1);
    for point in outcome.trace.iter().step_by(step) {
        table.push_row(Row::new(
            Styles::default(),
            vec![
                format!("{}", point.iteration).into(),
                format!("{:.6}", point.loss).into(),
            ],
        ));
    }
    if let Some(last) = outcome.trace.last() {
        table.push_row(Row::new(
            Styles::default(),
            vec![
                format!("{} (final)", last.iteration).into(),
                format!("{:.6}", last.loss).into(),
            ],
        ));
    }
    table
}
