//! Per-neighbour trust scores used by the countermeasure.

use std::fmt::{self, Display};

use crate::{config::TrustParams, simulation::SimTime};

/// Whether a gated action towards a neighbour may go ahead.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    /// Go ahead after waiting `delay` seconds.
    Admitted { delay: SimTime },
    Refused,
}

/// What an honest peer remembers about one neighbour's behaviour.
#[derive(Debug, Clone, PartialEq)]
pub struct TrustRecord {
    pub score: f64,
    pub bans: u32,
    pub successes: u32,
    pub attempts: u32,
}

impl TrustRecord {
    pub fn new(params: &TrustParams) -> Self {
        Self { score: params.max_score, bans: 0, successes: 1, attempts: 1 }
    }

    /// Restores full trust, clearing the ban count.
    pub fn reset(&mut self, params: &TrustParams) {
        *self = Self::new(params);
    }

    /// A requested block never arrived.
    pub fn record_failure(&mut self, params: &TrustParams) {
        self.score = (self.score - params.failure_penalty).max(0.0);
        self.successes = self.successes.saturating_sub(1);
        self.attempts += 1;
    }

    /// A block arrived from this neighbour.
    pub fn record_success(&mut self, params: &TrustParams) {
        self.score = (self.score + params.success_reward).min(params.max_score);
        self.successes += 1;
        self.attempts += 1;
    }

    /// Fraction of past exchanges that succeeded.
    pub fn success_ratio(&self) -> f64 {
        if self.attempts == 0 {
            return 0.0;
        }
        self.successes as f64 / self.attempts as f64
    }

    /// Delay applied to an admitted action, between 0 and `max_delay`.
    pub fn delay(&self, params: &TrustParams, max_delay: SimTime) -> SimTime {
        max_delay * (1.0 - self.success_ratio() * self.score / params.max_score)
    }

    /// Decides whether to deal with this neighbour. Every refusal counts as
    /// a ban, and the record starts over once bans exceed the limit.
    pub fn admit(
        &mut self,
        params: &TrustParams,
        max_delay: SimTime,
    ) -> Admission {
        if self.score > params.ban_threshold {
            return Admission::Admitted {
                delay: self.delay(params, max_delay),
            };
        }

        self.bans += 1;
        if self.bans > params.max_bans {
            self.reset(params);
        }
        Admission::Refused
    }
}

impl Display for TrustRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Score = {:.6} | H = {} {}",
            self.score, self.successes, self.attempts
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_record_has_no_delay() {
        let params = TrustParams::default();
        let record = TrustRecord::new(&params);

        assert_eq!(record.delay(&params, 400.0), 0.0);
        assert_eq!(record.to_string(), "Score = 100.000000 | H = 1 1");
    }

    #[test]
    fn failures_floor_at_zero() {
        let params = TrustParams::default();
        let mut record = TrustRecord::new(&params);

        for _ in 0..12 {
            record.record_failure(&params);
        }
        assert_eq!(record.score, 0.0);
        assert_eq!(record.successes, 0);
        assert_eq!(record.attempts, 13);
        assert_eq!(record.delay(&params, 400.0), 400.0);
    }

    #[test]
    fn success_is_capped() {
        let params = TrustParams::default();
        let mut record = TrustRecord::new(&params);

        record.record_failure(&params);
        record.record_success(&params);
        record.record_success(&params);
        assert_eq!(record.score, 92.0);
        assert_eq!((record.successes, record.attempts), (2, 4));

        for _ in 0..20 {
            record.record_success(&params);
        }
        assert_eq!(record.score, params.max_score);
    }

    #[test]
    fn delay_scales_with_trust() {
        let params = TrustParams::default();
        let mut record = TrustRecord::new(&params);
        // 3 successes out of 4 attempts at half score
        record.score = 50.0;
        record.successes = 3;
        record.attempts = 4;

        let delay = record.delay(&params, 400.0);
        assert!((delay - 400.0 * (1.0 - 0.75 * 0.5)).abs() < 1e-9);
    }

    #[test]
    fn repeated_bans_reset_record() {
        let params = TrustParams::default();
        let mut record = TrustRecord::new(&params);
        for _ in 0..8 {
            record.record_failure(&params);
        }
        assert_eq!(record.score, 20.0);

        for ban in 1..=params.max_bans {
            assert_eq!(record.admit(&params, 400.0), Admission::Refused);
            assert_eq!(record.bans, ban);
        }

        // One more refusal pushes the count past the limit
        assert_eq!(record.admit(&params, 400.0), Admission::Refused);
        assert_eq!(record, TrustRecord::new(&params));
        assert_eq!(
            record.admit(&params, 400.0),
            Admission::Admitted { delay: 0.0 }
        );
    }
}
