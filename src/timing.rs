//! Link latency model.
//!
//! A message of `size` bits sent from peer `i` to peer `j` arrives after
//! `rho + size / c + d`, where `c` is the link speed (fast only when both
//! ends are fast), `rho` is a uniform propagation delay and `d` is an
//! exponential queuing delay with mean `queuing_factor / c`.

use rand::Rng;

use crate::{
    config::LinkParams,
    simulation::SimTime,
    utils::{exponential, uniform},
};

/// Returns the one-way latency, in seconds, of a `size`-bit message.
///
/// `overlay` selects the colluders' low-latency overlay propagation range
/// instead of the public one.
pub fn latency<R: Rng + ?Sized>(
    size: u64,
    fast_sender: bool,
    fast_receiver: bool,
    overlay: bool,
    params: &LinkParams,
    rng: &mut R,
) -> SimTime {
    let speed = if fast_sender && fast_receiver {
        params.fast_link_speed
    } else {
        params.slow_link_speed
    };

    let propagation_ms = if overlay {
        uniform(
            params.min_overlay_propagation_ms,
            params.max_overlay_propagation_ms,
            rng,
        )
    } else {
        uniform(params.min_propagation_ms, params.max_propagation_ms, rng)
    };
    let queuing = exponential(params.queuing_factor / speed, rng);

    let latency_ms =
        propagation_ms + (size as f64 / speed) * 1e3 + queuing * 1e3;
    latency_ms / 1e3
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn latency_respects_propagation_floor() {
        let params = LinkParams::default();
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        for _ in 0..200 {
            let l = latency(512, false, false, false, &params, &mut rng);
            // 10ms propagation plus 512 bits at 5Mb/s
            assert!(l >= 0.010 + 512.0 / 5e6);
        }
    }

    #[test]
    fn overlay_links_are_faster_on_average() {
        let params = LinkParams::default();
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let n = 2000;

        let public: f64 = (0..n)
            .map(|_| latency(512, true, true, false, &params, &mut rng))
            .sum();
        let overlay: f64 = (0..n)
            .map(|_| latency(512, true, true, true, &params, &mut rng))
            .sum();

        assert!(overlay < public);
    }

    #[test]
    fn block_transfer_dominated_by_slow_link() {
        let params = LinkParams::default();
        let mut rng = ChaCha8Rng::seed_from_u64(5);

        // 8Mbit over 5Mb/s takes at least 1.6 seconds
        let slow = latency(8_000_000, true, false, false, &params, &mut rng);
        assert!(slow >= 1.6);

        let fast = latency(8_000_000, true, true, true, &params, &mut rng);
        assert!(fast < 1.6);
    }
}
