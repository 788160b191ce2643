//! The combinatorial scoring primitive: a race to a points threshold with an optional
//! advantage phase. A game, a tie-break, a set and the match itself are all instances of
//! the same block with different parameters; a block is evaluated against the win
//! probability of whatever unit it races (points for a game, games for a set, sets for
//! the match).

use crate::comb::race_orderings;
use crate::dual::Scalar;

#[derive(Clone, Debug, PartialEq)]
pub struct ScoreBlock {
    score_end: u16,
    max_advantages: Option<u16>,
    path_counts: Vec<f64>,
}
impl ScoreBlock {
    /// `score_end` is the points tally that ends the block outright. `max_advantages`
    /// caps the sudden-death extensions available once both sides reach `score_end − 1`:
    /// `Some(0)` plays a single decisive point immediately, `Some(k)` allows `k` tied
    /// extension rounds before the decisive point, and `None` extends indefinitely
    /// (classic deuce).
    pub fn new(score_end: u16, max_advantages: Option<u16>) -> Self {
        assert!(score_end > 0, "score_end must be at least 1");
        let path_counts = (0..score_end)
            .map(|trailing| race_orderings(score_end, trailing) as f64)
            .collect();
        Self {
            score_end,
            max_advantages,
            path_counts,
        }
    }

    pub fn score_end(&self) -> u16 {
        self.score_end
    }

    pub fn max_advantages(&self) -> Option<u16> {
        self.max_advantages
    }

    /// Probability of the exact final score `score_a`–`score_b`, given the probability of
    /// side A taking a single point and, separately, the decisive sudden-death point.
    /// The empty score `(0, 0)` has probability 1.
    pub fn score_probability<S: Scalar>(
        &self,
        score_a: u16,
        score_b: u16,
        p_point: S,
        p_decider: S,
    ) -> S {
        let e1 = (self.score_end - 1) as i32;
        let trailing = score_a.min(score_b) as i32;
        let low = trailing.min(e1);
        let high = trailing.max(e1);
        let paths = self.path_counts[low as usize] * 2f64.powi(high - e1);
        let decider_played = self
            .max_advantages
            .is_some_and(|cap| trailing == e1 + cap as i32);
        if decider_played {
            // the sides traded points all the way to the decisive one
            let traded = (p_point * p_point.complement()).powi(high);
            let last = if score_a > score_b {
                p_decider
            } else {
                p_decider.complement()
            };
            traded * last * paths
        } else {
            p_point.powi(score_a as i32) * p_point.complement().powi(score_b as i32) * paths
        }
    }

    /// Aggregate probability that side A takes the block, decomposed into three mutually
    /// exclusive routes: outright, during advantage rounds, and at the decisive point.
    pub fn win_probability<S: Scalar>(&self, p_point: S, p_decider: S) -> S {
        self.win_outright(p_point)
            + self.win_during_advantages(p_point)
            + self.win_at_decider(p_point, p_decider)
    }

    /// Side A reaches `score_end` before the advantage region is entered.
    pub fn win_outright<S: Scalar>(&self, p_point: S) -> S {
        let mut sum = S::constant(0.0);
        for trailing in 0..self.score_end - 1 {
            sum = sum + self.score_probability(self.score_end, trailing, p_point, p_point);
        }
        sum
    }

    /// Side A clinches a tied extension round before the decisive point: a geometric
    /// series over re-tying rounds, truncated by the advantage cap when one applies.
    pub fn win_during_advantages<S: Scalar>(&self, p_point: S) -> S {
        if self.max_advantages == Some(0) {
            return S::constant(0.0);
        }
        let e1 = (self.score_end - 1) as i32;
        let deuce_paths = self.path_counts[e1 as usize];
        let retie = p_point * p_point.complement() * 2.0;
        let series = match self.max_advantages {
            Some(cap) => retie.powi(cap as i32).complement() / retie.complement(),
            None => S::constant(1.0) / retie.complement(),
        };
        p_point.powi(e1 + 2) * p_point.complement().powi(e1) * series * deuce_paths
    }

    /// Side A takes the decisive sudden-death point once the advantage cap is exhausted.
    /// Zero for an uncapped block, which never reaches one.
    pub fn win_at_decider<S: Scalar>(&self, p_point: S, p_decider: S) -> S {
        let Some(cap) = self.max_advantages else {
            return S::constant(0.0);
        };
        let e1 = (self.score_end - 1) as i32;
        let paths = self.path_counts[e1 as usize] * 2f64.powi(cap as i32);
        (p_point * p_point.complement()).powi(e1 + cap as i32) * p_decider * paths
    }
}
