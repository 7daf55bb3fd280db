//! Human pacing parameters and the random draws built from them.
//!
//! Every function here is pure given its RNG, so a seeded
//! [`rand::rngs::StdRng`] makes a whole send plan reproducible.

use std::ops::RangeInclusive;
use std::time::Duration;

use rand::Rng;

/// Bounds for typing simulation, delays and send flags.
#[derive(Clone, Debug)]
pub struct Pacing {
    /// Typing time added per character of text.
    pub typing_per_char:   Duration,
    /// Upper bound (exclusive) of the random extra typing time.
    pub typing_extra_max:  Duration,
    pub typing_min:        Duration,
    pub typing_max:        Duration,
    /// Re-send the typing action this often while it is held.
    pub typing_refresh:    Duration,
    pub pre_send:          RangeInclusive<Duration>,
    pub post_send:         RangeInclusive<Duration>,
    /// Symmetric jitter added to every delay.
    pub jitter:            Duration,
    /// No delay is ever shorter than this.
    pub delay_floor:       Duration,
    pub no_webpage_chance: f64,
    pub silent_chance:     f64,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            typing_per_char:   Duration::from_millis(50),
            typing_extra_max:  Duration::from_millis(1000),
            typing_min:        Duration::from_millis(1000),
            typing_max:        Duration::from_millis(5000),
            typing_refresh:    Duration::from_secs(4),
            pre_send:          Duration::from_millis(300)..=Duration::from_millis(1500),
            post_send:         Duration::from_millis(1000)..=Duration::from_millis(3000),
            jitter:            Duration::from_millis(250),
            delay_floor:       Duration::from_millis(100),
            no_webpage_chance: 0.20,
            silent_chance:     0.05,
        }
    }
}

impl Pacing {
    /// `clamp(chars * per_char + U[0, extra_max), min, max)`. Swapped
    /// bounds are put back in order.
    pub fn typing_duration<R: Rng + ?Sized>(&self, text: &str, rng: &mut R) -> Duration {
        let chars = u32::try_from(text.chars().count()).unwrap_or(u32::MAX);
        let base  = self.typing_per_char.saturating_mul(chars);
        let extra = uniform_below(rng, self.typing_extra_max);
        let lo = self.typing_min.min(self.typing_max);
        let hi = self.typing_min.max(self.typing_max);
        base.saturating_add(extra).clamp(lo, hi)
    }

    /// Uniform draw from `range`, plus `±jitter`, floored at `delay_floor`.
    pub fn jittered<R: Rng + ?Sized>(&self, range: &RangeInclusive<Duration>, rng: &mut R) -> Duration {
        let lo = millis(*range.start());
        let hi = millis(*range.end()).max(lo);
        let j  = millis(self.jitter) as i64;
        let base = rng.gen_range(lo..=hi) as i64;
        let off  = if j > 0 { rng.gen_range(-j..=j) } else { 0 };
        let ms = (base + off).max(millis(self.delay_floor) as i64);
        Duration::from_millis(ms as u64)
    }

    /// Draw everything one send needs, in a fixed order.
    pub fn plan<R: Rng + ?Sized>(&self, text: &str, simulate_typing: bool, rng: &mut R) -> SendPlan {
        let typing = simulate_typing.then(|| self.typing_duration(text, rng));
        SendPlan {
            typing,
            pre_send:   self.jittered(&self.pre_send, rng),
            post_send:  self.jittered(&self.post_send, rng),
            no_webpage: rng.gen_bool(probability(self.no_webpage_chance)),
            silent:     rng.gen_bool(probability(self.silent_chance)),
            random_id:  rng.next_u64() as i64,
        }
    }
}

/// The randomized choices for one send, drawn up front.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendPlan {
    /// How long to show "typing…"; `None` skips the indicator.
    pub typing:     Option<Duration>,
    pub pre_send:   Duration,
    pub post_send:  Duration,
    pub no_webpage: bool,
    pub silent:     bool,
    pub random_id:  i64,
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// NaN counts as "never".
fn probability(p: f64) -> f64 {
    if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) }
}

fn uniform_below<R: Rng + ?Sized>(rng: &mut R, max: Duration) -> Duration {
    match millis(max) {
        0 => Duration::ZERO,
        m => Duration::from_millis(rng.gen_range(0..m)),
    }
}
