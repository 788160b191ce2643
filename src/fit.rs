//! Top-level fitting: turns an assembled [`Loss`] into a normalised, ranked ability
//! table.

use crate::loss::Loss;
use crate::opt::{adam_descent, AdamConfig, ExponentialSchedule, TracePoint};
use anyhow::bail;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// The median fitted ability is shifted onto this value. Only ability differences are
/// observable through the score model, so the anchor is pure convention.
pub const ABILITY_BASELINE: f64 = 100.0;

/// Numeric backend the fit runs on, chosen once up front. Only the CPU backend exists;
/// asking for an accelerator fails before any computation starts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Backend {
    #[default]
    Cpu,
    Gpu,
}
impl Backend {
    pub fn ensure_available(&self) -> Result<(), anyhow::Error> {
        match self {
            Backend::Cpu => Ok(()),
            Backend::Gpu => bail!("the GPU backend is not available in this build"),
        }
    }
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cpu" => Ok(Backend::Cpu),
            "gpu" => Ok(Backend::Gpu),
            other => bail!("unknown backend '{other}'"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FitOptions {
    pub backend: Backend,
    pub iterations: u64,
    pub lr_start: f64,
    pub lr_end: f64,
    /// Log progress every this many iterations; 0 disables.
    pub verbose_every: u64,
}
impl Default for FitOptions {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            iterations: 1000,
            lr_start: 0.1,
            lr_end: 0.001,
            verbose_every: 100,
        }
    }
}

impl FitOptions {
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.backend.ensure_available()?;
        self.adam_config().validate()
    }

    fn adam_config(&self) -> AdamConfig {
        let mut config = AdamConfig::with_schedule(ExponentialSchedule {
            lr_start: self.lr_start,
            lr_end: self.lr_end,
            steps: self.iterations,
        });
        config.verbose_every = self.verbose_every;
        config
    }
}

/// A fitted player: ability on the median-100 scale, and 1-based rank in descending
/// ability order.
#[derive(Clone, Debug, PartialEq)]
pub struct PlayerRating {
    pub ability: f64,
    pub rank: u32,
}

#[derive(Debug)]
pub struct FitOutcome {
    pub trace: Vec<TracePoint>,
    pub ratings: Vec<PlayerRating>,
    pub elapsed: Duration,
}

/// Fits one ability per player by minimising `loss` from a zero start, then anchors the
/// median at [`ABILITY_BASELINE`] and ranks every player.
pub fn fit_abilities(
    loss: &Loss,
    num_players: usize,
    options: &FitOptions,
) -> Result<FitOutcome, anyhow::Error> {
    options.validate()?;
    info!(
        "fitting {num_players} abilities over {} matches, {} iterations",
        loss.matches(),
        options.iterations
    );

    let start_time = Instant::now();
    let mut abilities = vec![0.0; num_players];
    let trace = adam_descent(&options.adam_config(), &mut abilities, |params, grad| {
        loss.evaluate_with_grad(params, grad)
    });
    let elapsed = start_time.elapsed();

    if let Some(last) = trace.last() {
        debug!("final loss {:.6} after {elapsed:?}", last.loss);
    }

    let shift = ABILITY_BASELINE - median(&abilities);
    for ability in &mut abilities {
        *ability += shift;
    }

    Ok(FitOutcome {
        trace,
        ratings: rank_descending(&abilities),
        elapsed,
    })
}

/// The 0.5 quantile with linear interpolation between the two middle order statistics.
fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap());
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    }
}

/// Dense 1-based ranks in descending ability order; ties resolve to the lower player
/// index.
fn rank_descending(abilities: &[f64]) -> Vec<PlayerRating> {
    let mut order: Vec<usize> = (0..abilities.len()).collect();
    order.sort_by(|&lhs, &rhs| abilities[rhs].partial_cmp(&abilities[lhs]).unwrap());
    let mut ratings: Vec<PlayerRating> = abilities
        .iter()
        .map(|&ability| PlayerRating { ability, rank: 0 })
        .collect();
    for (position, &player) in order.iter().enumerate() {
        ratings[player].rank = position as u32 + 1;
    }
    ratings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loss::Regularization;
    use assert_float_eq::*;

    #[test]
    fn gpu_backend_fails_fast() {
        let options = FitOptions {
            backend: "gpu".parse().unwrap(),
            ..FitOptions::default()
        };
        let loss = Loss::new(Regularization::L2 { coupling: 0.1 }).unwrap();
        let result = fit_abilities(&loss, 2, &options);
        assert_eq!(
            "the GPU backend is not available in this build",
            result.unwrap_err().to_string()
        );
        assert!("tpu".parse::<Backend>().is_err());
    }

    #[test]
    fn median_interpolates() {
        assert_eq!(2.0, median(&[3.0, 1.0, 2.0]));
        assert_eq!(2.5, median(&[4.0, 1.0, 2.0, 3.0]));
        assert_eq!(7.0, median(&[7.0]));
        assert_eq!(0.0, median(&[]));
    }

    #[test]
    fn ranks_descend_with_stable_ties() {
        let ratings = rank_descending(&[1.0, 3.0, 1.0, 2.0]);
        // the tied players at 1.0 keep their index order
        assert_eq!(
            vec![3, 1, 4, 2],
            ratings.iter().map(|rating| rating.rank).collect::<Vec<_>>()
        );
    }

    fn one_sided_corpus() -> Loss {
        let mut loss = Loss::new(Regularization::L2 { coupling: 0.05 }).unwrap();
        // player 0 sweeps player 1, every time
        let scores = vec![[6u16, 1, 6, 2, 0, 0]; 8];
        let players = vec![[0usize, 0, 1, 1]; 8];
        let weights = vec![1.0; 8];
        loss.add("single_advantage", &scores, &players, &weights)
            .unwrap();
        loss
    }

    #[test]
    fn fits_a_positive_ability_gap() {
        let loss = one_sided_corpus();
        let options = FitOptions {
            iterations: 400,
            verbose_every: 0,
            ..FitOptions::default()
        };
        let outcome = fit_abilities(&loss, 2, &options).unwrap();

        let [winner, loser] = &outcome.ratings[..] else {
            panic!("expected two ratings")
        };
        assert!(
            winner.ability > loser.ability + 1.0,
            "gap too small: {} vs {}",
            winner.ability,
            loser.ability
        );
        assert_eq!(1, winner.rank);
        assert_eq!(2, loser.rank);
    }

    #[test]
    fn abilities_are_median_anchored() {
        let loss = one_sided_corpus();
        let options = FitOptions {
            iterations: 200,
            verbose_every: 0,
            ..FitOptions::default()
        };
        let outcome = fit_abilities(&loss, 2, &options).unwrap();
        let median = (outcome.ratings[0].ability + outcome.ratings[1].ability) / 2.0;
        assert_float_absolute_eq!(ABILITY_BASELINE, median, 1e-9);
    }

    #[test]
    fn loss_trace_trends_down() {
        let loss = one_sided_corpus();
        let options = FitOptions {
            iterations: 300,
            verbose_every: 0,
            ..FitOptions::default()
        };
        let outcome = fit_abilities(&loss, 2, &options).unwrap();
        assert_eq!(300, outcome.trace.len());

        // averaged over windows to tolerate the odd uphill step
        let window = 50;
        let averages: Vec<f64> = outcome
            .trace
            .chunks(window)
            .map(|chunk| chunk.iter().map(|point| point.loss).sum::<f64>() / chunk.len() as f64)
            .collect();
        for pair in averages.windows(2) {
            assert!(
                pair[1] <= pair[0] + 1e-9,
                "moving average rose: {pair:?}"
            );
        }
    }

    #[test]
    fn empty_loss_fits_trivially() {
        let loss = Loss::new(Regularization::L2 { coupling: 0.1 }).unwrap();
        let options = FitOptions {
            iterations: 5,
            verbose_every: 0,
            ..FitOptions::default()
        };
        let outcome = fit_abilities(&loss, 3, &options).unwrap();
        assert_eq!(5, outcome.trace.len());
        // with no evidence, regularisation keeps everyone at the anchor
        for rating in &outcome.ratings {
            assert_float_absolute_eq!(ABILITY_BASELINE, rating.ability, 1e-9);
        }
    }
}
