use std::env;
use std::error::Error;
use std::path::PathBuf;

use anyhow::bail;
use clap::Parser;
use serde::Serialize;
use stanza::renderer::console::Console;
use stanza::renderer::Renderer;
use tracing::{debug, info};

use topspin::csv::CsvWriter;
use topspin::data::{self, DEFAULT_HALF_LIFE};
use topspin::fit::{fit_abilities, Backend, FitOptions};
use topspin::loss::{Loss, Regularization};
use topspin::print::{tabulate_fit_summary, tabulate_ratings, RatingRow};

#[derive(Debug, clap::Parser, Clone)]
struct Args {
    /// file to source match data from
    #[clap(short = 'f', long)]
    file: PathBuf,

    /// number of optimisation iterations
    #[clap(long, default_value_t = 1000)]
    iterations: u64,

    /// initial learning rate
    #[clap(long, default_value_t = 0.1)]
    lr_start: f64,

    /// final learning rate
    #[clap(long, default_value_t = 0.001)]
    lr_end: f64,

    /// regularisation flavour: 'l1' or 'l2'
    #[clap(long, default_value = "l2")]
    regularization: String,

    /// regularisation coupling constant
    #[clap(long, default_value_t = 1.0 / (2.0 * std::f64::consts::PI))]
    coupling: f64,

    /// recency half-life in days
    #[clap(long, default_value_t = DEFAULT_HALF_LIFE)]
    half_life: f64,

    /// numeric backend: 'cpu' or 'gpu'
    #[clap(long, default_value = "cpu")]
    backend: String,

    /// write the fitted ratings to a CSV file
    #[clap(long)]
    export_csv: Option<PathBuf>,

    /// write the fitted ratings to a JSON file
    #[clap(long)]
    export_json: Option<PathBuf>,
}
impl Args {
    fn validate(&self) -> anyhow::Result<()> {
        if self.half_life <= 0.0 {
            bail!("half-life must be positive");
        }
        Ok(())
    }

    fn regularization(&self) -> anyhow::Result<Regularization> {
        match self.regularization.as_str() {
            "l1" => Ok(Regularization::L1 {
                coupling: self.coupling,
            }),
            "l2" => Ok(Regularization::L2 {
                coupling: self.coupling,
            }),
            other => bail!("regularisation must be 'l1' or 'l2', not '{other}'"),
        }
    }
}

#[derive(Debug, Serialize)]
struct RatingExport<'a> {
    rank: u32,
    player: &'a str,
    ability: f64,
    matches: usize,
}

fn main() -> Result<(), Box<dyn Error>> {
    if env::var("RUST_BACKTRACE").is_err() {
        env::set_var("RUST_BACKTRACE", "full")
    }
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info")
    }
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    args.validate()?;
    debug!("args: {args:?}");

    let imported = data::read_matches(&args.file, args.half_life)?;
    info!(
        "imported {} matches ({} skipped), {} players",
        imported.records.len(),
        imported.skipped,
        imported.players.len()
    );

    let mut loss = Loss::new(args.regularization()?)?;
    for record in &imported.records {
        loss.add(
            &record.scoring_system.to_string(),
            &[record.normalized_score],
            &[record.players],
            &[record.weight],
        )?;
    }

    let options = FitOptions {
        backend: args.backend.parse::<Backend>()?,
        iterations: args.iterations,
        lr_start: args.lr_start,
        lr_end: args.lr_end,
        ..FitOptions::default()
    };
    let outcome = fit_abilities(&loss, imported.players.len(), &options)?;
    info!("fitted in {:?}", outcome.elapsed);

    let mut match_counts = vec![0_usize; imported.players.len()];
    let mut last_played = vec![None; imported.players.len()];
    for record in &imported.records {
        let mut slots = record.players.to_vec();
        slots.sort_unstable();
        slots.dedup();
        for player in slots {
            match_counts[player] += 1;
            if last_played[player].map_or(true, |date| date < record.date) {
                last_played[player] = Some(record.date);
            }
        }
    }

    let mut rows: Vec<RatingRow> = outcome
        .ratings
        .iter()
        .enumerate()
        .map(|(player, rating)| RatingRow {
            rank: rating.rank,
            player: imported.players[player].clone(),
            ability: rating.ability,
            matches: match_counts[player],
            last_played: last_played[player]
                .map(|date| date.to_string())
                .unwrap_or_default(),
        })
        .collect();
    rows.sort_by_key(|row| row.rank);

    println!("{}", Console::default().render(&tabulate_ratings(&rows)));
    println!(
        "Loss trace:\n{}",
        Console::default().render(&tabulate_fit_summary(&outcome))
    );

    if let Some(path) = &args.export_csv {
        let mut writer = CsvWriter::create(path)?;
        writer.append(["rank", "player", "ability", "matches"])?;
        for row in &rows {
            writer.append([
                row.rank.to_string(),
                row.player.clone(),
                format!("{:.4}", row.ability),
                row.matches.to_string(),
            ])?;
        }
        writer.flush()?;
        info!("ratings written to {}", path.display());
    }

    if let Some(path) = &args.export_json {
        let exports: Vec<RatingExport> = rows
            .iter()
            .map(|row| RatingExport {
                rank: row.rank,
                player: &row.player,
                ability: row.ability,
                matches: row.matches,
            })
            .collect();
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, &exports)?;
        info!("ratings written to {}", path.display());
    }

    Ok(())
}
