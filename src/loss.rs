//! The fitting objective: negated log-likelihood terms, one per scoring system present in
//! the data, plus a regularisation penalty that pins down under-observed players.

use crate::likelihood::{BatchMismatch, LogLikelihoodTerm, PlayerSlots};
use crate::scoring::{Score, Variant};
use rustc_hash::FxHashMap;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
#[error("regularisation coupling must be positive, got {0}")]
pub struct InvalidCoupling(f64);

#[derive(Debug, Error)]
pub enum LossError {
    #[error("unknown scoring system '{0}'")]
    UnknownScoringSystem(String),

    #[error(transparent)]
    BatchMismatch(#[from] BatchMismatch),
}

/// Penalty on the ability vector. The coupling must be positive; a non-positive value is
/// rejected at construction through [`Regularization::validate`] in [`Loss::new`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Regularization {
    L1 { coupling: f64 },
    L2 { coupling: f64 },
}
impl Regularization {
    pub fn validate(&self) -> Result<(), InvalidCoupling> {
        let coupling = match self {
            Regularization::L1 { coupling } | Regularization::L2 { coupling } => *coupling,
        };
        if coupling <= 0.0 {
            return Err(InvalidCoupling(coupling));
        }
        Ok(())
    }

    pub fn penalty(&self, abilities: &[f64]) -> f64 {
        match self {
            Regularization::L1 { coupling } => {
                coupling * abilities.iter().map(|ability| ability.abs()).sum::<f64>()
            }
            Regularization::L2 { coupling } => {
                coupling * abilities.iter().map(|ability| ability * ability).sum::<f64>()
            }
        }
    }

    /// As [`Self::penalty`], accumulating `∂penalty/∂ability` into `grad`. The L1
    /// subgradient at zero is taken as zero.
    pub fn penalty_with_grad(&self, abilities: &[f64], grad: &mut [f64]) -> f64 {
        match self {
            Regularization::L1 { coupling } => {
                for (ability, grad) in abilities.iter().zip(grad.iter_mut()) {
                    if *ability != 0.0 {
                        *grad += coupling * ability.signum();
                    }
                }
            }
            Regularization::L2 { coupling } => {
                for (ability, grad) in abilities.iter().zip(grad.iter_mut()) {
                    *grad += 2.0 * coupling * ability;
                }
            }
        }
        self.penalty(abilities)
    }
}

/// The complete objective. Log-likelihood terms are created lazily, on the first batch of
/// matches naming their scoring system.
pub struct Loss {
    terms: FxHashMap<Variant, LogLikelihoodTerm>,
    regularization: Regularization,
}
impl Loss {
    pub fn new(regularization: Regularization) -> Result<Self, InvalidCoupling> {
        regularization.validate()?;
        Ok(Self {
            terms: FxHashMap::default(),
            regularization,
        })
    }

    /// Number of matches accumulated across all terms.
    pub fn matches(&self) -> usize {
        self.terms.values().map(LogLikelihoodTerm::len).sum()
    }

    /// Routes a batch of matches to the term for the named scoring system, instantiating
    /// it on first use. Unknown names fail here, at the point of use.
    pub fn add(
        &mut self,
        scoring_system: &str,
        scores: &[Score],
        players: &[PlayerSlots],
        weights: &[f64],
    ) -> Result<(), LossError> {
        let variant = Variant::from_str(scoring_system)
            .map_err(|_| LossError::UnknownScoringSystem(scoring_system.into()))?;
        self.terms
            .entry(variant)
            .or_insert_with(|| LogLikelihoodTerm::new(variant.system()))
            .add(scores, players, weights)?;
        Ok(())
    }

    /// `−Σ log-likelihood + penalty`: the scalar the optimiser minimises.
    pub fn evaluate(&self, abilities: &[f64]) -> f64 {
        let log_likelihood: f64 = self
            .terms
            .values()
            .map(|term| term.evaluate(abilities))
            .sum();
        self.regularization.penalty(abilities) - log_likelihood
    }

    /// As [`Self::evaluate`], writing `∂loss/∂ability` over `grad`.
    pub fn evaluate_with_grad(&self, abilities: &[f64], grad: &mut [f64]) -> f64 {
        grad.fill(0.0);
        let mut log_likelihood = 0.0;
        for term in self.terms.values() {
            log_likelihood += term.evaluate_with_grad(abilities, grad);
        }
        for grad in grad.iter_mut() {
            *grad = -*grad;
        }
        self.regularization.penalty_with_grad(abilities, grad) - log_likelihood
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::assert_slice_f64_relative;
    use assert_float_eq::*;

    #[test]
    fn non_positive_coupling_rejected() {
        assert_eq!(
            Err(InvalidCoupling(0.0)),
            Loss::new(Regularization::L1 { coupling: 0.0 }).map(|_| ())
        );
        assert_eq!(
            Err(InvalidCoupling(-0.5)),
            Loss::new(Regularization::L2 { coupling: -0.5 }).map(|_| ())
        );
        assert!(Loss::new(Regularization::L2 { coupling: 0.1 }).is_ok());
    }

    #[test]
    fn penalties() {
        let abilities = [1.0, -2.0, 0.0, 0.5];
        assert_float_absolute_eq!(
            0.7,
            Regularization::L1 { coupling: 0.2 }.penalty(&abilities),
            1e-12
        );
        assert_float_absolute_eq!(
            1.05,
            Regularization::L2 { coupling: 0.2 }.penalty(&abilities),
            1e-12
        );
    }

    #[test]
    fn penalty_gradients() {
        let abilities = [1.0, -2.0, 0.0, 0.5];
        let mut grad = [0.0; 4];
        Regularization::L1 { coupling: 0.2 }.penalty_with_grad(&abilities, &mut grad);
        assert_slice_f64_relative(&[0.2, -0.2, 0.0, 0.2], &grad, 1e-12);

        let mut grad = [0.0; 4];
        Regularization::L2 { coupling: 0.2 }.penalty_with_grad(&abilities, &mut grad);
        assert_slice_f64_relative(&[0.4, -0.8, 0.0, 0.2], &grad, 1e-12);
    }

    #[test]
    fn unknown_scoring_system_fails_at_add() {
        let mut loss = Loss::new(Regularization::L2 { coupling: 0.1 }).unwrap();
        let result = loss.add("underwater_rules", &[], &[], &[]);
        assert_eq!(
            "unknown scoring system 'underwater_rules'",
            result.unwrap_err().to_string()
        );
    }

    #[test]
    fn terms_created_lazily_per_system() {
        let mut loss = Loss::new(Regularization::L2 { coupling: 0.1 }).unwrap();
        assert_eq!(0, loss.matches());
        loss.add(
            "single_advantage",
            &[[6, 1, 6, 2, 0, 0]],
            &[[0, 0, 1, 1]],
            &[1.0],
        )
        .unwrap();
        loss.add(
            "classic_advantage",
            &[[4, 6, 6, 3, 10, 8]],
            &[[0, 0, 2, 2]],
            &[0.5],
        )
        .unwrap();
        loss.add(
            "single_advantage",
            &[[6, 0, 6, 0, 0, 0]],
            &[[2, 2, 1, 1]],
            &[2.0],
        )
        .unwrap();
        assert_eq!(3, loss.matches());
        assert_eq!(2, loss.terms.len());
    }

    #[test]
    fn loss_negates_likelihood_and_adds_penalty() {
        let mut loss = Loss::new(Regularization::L2 { coupling: 0.1 }).unwrap();
        loss.add(
            "single_advantage",
            &[[6, 1, 6, 2, 0, 0]],
            &[[0, 0, 1, 1]],
            &[1.25],
        )
        .unwrap();
        let abilities = [1.5, -0.5];
        // the likelihood term alone evaluates to 1.25·ln P = −4.4221018033599755
        let expected = 4.4221018033599755 + 0.1 * (1.5 * 1.5 + 0.5 * 0.5);
        assert_float_absolute_eq!(expected, loss.evaluate(&abilities), 1e-12);
    }

    #[test]
    fn gradient_matches_finite_differences() {
        let mut loss = Loss::new(Regularization::L1 { coupling: 0.05 }).unwrap();
        loss.add(
            "single_advantage",
            &[[6, 1, 6, 2, 0, 0], [6, 3, 4, 6, 11, 9]],
            &[[0, 0, 1, 1], [2, 3, 0, 1]],
            &[1.0, 0.8],
        )
        .unwrap();
        loss.add(
            "classic_advantage",
            &[[2, 6, 2, 6, 0, 0]],
            &[[3, 3, 2, 2]],
            &[1.5],
        )
        .unwrap();

        let abilities = [0.7, -0.4, 0.9, 0.1];
        let mut grad = [0.0; 4];
        let value = loss.evaluate_with_grad(&abilities, &mut grad);
        assert_float_absolute_eq!(loss.evaluate(&abilities), value, 1e-12);

        const H: f64 = 1e-6;
        let mut expected = [0.0; 4];
        for (player, expected) in expected.iter_mut().enumerate() {
            let mut perturbed = abilities;
            perturbed[player] += H;
            let above = loss.evaluate(&perturbed);
            perturbed[player] -= 2.0 * H;
            let below = loss.evaluate(&perturbed);
            *expected = (above - below) / (2.0 * H);
        }
        assert_slice_f64_relative(&expected, &grad, 1e-4);
    }
}
