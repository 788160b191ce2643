//! The weighted log-likelihood of a batch of matches played under one scoring system,
//! stored column-wise and evaluated against a candidate ability vector.

use crate::dual::{Dual, Scalar, LANES};
use crate::scoring::{Score, ScoringSystem};
use thiserror::Error;

/// Probabilities are floored before the logarithm: a zero can only arise from
/// floating-point underflow on an extreme ability gap, and must not poison the loss with
/// `-inf`.
const PROBABILITY_FLOOR: f64 = 1e-40;

/// Player indices of the four on-court slots, ordered A1, A2, B1, B2. Singles matches
/// repeat each side's player in both of its slots, so one layout serves both match types.
pub type PlayerSlots = [usize; LANES];

#[derive(Debug, Error, PartialEq, Eq)]
#[error("scores ({scores}), player slots ({players}) and weights ({weights}) must agree in length")]
pub struct BatchMismatch {
    scores: usize,
    players: usize,
    weights: usize,
}

/// Append-only columnar store of matches, all sharing one scoring system.
#[derive(Debug)]
pub struct LogLikelihoodTerm {
    system: ScoringSystem,
    scores: Vec<Score>,
    players: Vec<PlayerSlots>,
    weights: Vec<f64>,
}
impl LogLikelihoodTerm {
    pub fn new(system: ScoringSystem) -> Self {
        Self {
            system,
            scores: vec![],
            players: vec![],
            weights: vec![],
        }
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Appends a batch of matches. The three columns must agree in length; a mismatch
    /// leaves the term untouched.
    pub fn add(
        &mut self,
        scores: &[Score],
        players: &[PlayerSlots],
        weights: &[f64],
    ) -> Result<(), BatchMismatch> {
        if scores.len() != players.len() || scores.len() != weights.len() {
            return Err(BatchMismatch {
                scores: scores.len(),
                players: players.len(),
                weights: weights.len(),
            });
        }
        self.scores.extend_from_slice(scores);
        self.players.extend_from_slice(players);
        self.weights.extend_from_slice(weights);
        Ok(())
    }

    /// The weighted sum of per-match log-probabilities under the given abilities. Zero
    /// for an empty term. (The caller negates this into a loss.)
    pub fn evaluate(&self, abilities: &[f64]) -> f64 {
        let mut sum = 0.0;
        for (index, score) in self.scores.iter().enumerate() {
            let gathered = self.players[index].map(|player| abilities[player]);
            let probability = self.system.score_probability(score, &gathered);
            sum += self.weights[index] * (probability + PROBABILITY_FLOOR).ln();
        }
        sum
    }

    /// As [`Self::evaluate`], additionally accumulating `∂(log-likelihood)/∂ability` into
    /// `grad` (which must span every player referenced by this term).
    pub fn evaluate_with_grad(&self, abilities: &[f64], grad: &mut [f64]) -> f64 {
        let mut sum = 0.0;
        for (index, score) in self.scores.iter().enumerate() {
            let slots = self.players[index];
            let gathered: [Dual; LANES] =
                std::array::from_fn(|lane| Dual::variable(abilities[slots[lane]], lane));
            let probability = self.system.score_probability(score, &gathered);
            let log_probability = (probability + PROBABILITY_FLOOR).ln();
            let weight = self.weights[index];
            sum += weight * log_probability.value();
            for (lane, &slot) in slots.iter().enumerate() {
                grad[slot] += weight * log_probability.grad[lane];
            }
        }
        sum
    }
}
