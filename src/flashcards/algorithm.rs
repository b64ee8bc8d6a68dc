//! FSRS memory model
//!
//! Computes retrievability from a power-law forgetting curve and updates a
//! card's stability and difficulty after each review. Every function takes
//! its constants from an explicit [`Parameters`] value.
//!
//! Grades (1-4):
//! - 1: Again, recall failed
//! - 2: Hard, recalled with serious difficulty
//! - 3: Good, recalled after hesitation
//! - 4: Easy, recalled without effort

use chrono::{Days, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::models::Grade;

/// Exponent of the forgetting curve
pub const DECAY: f64 = -0.5;
/// Chosen so that retrievability is 0.9 when elapsed days equal stability
pub const FACTOR: f64 = 19.0 / 81.0;

pub const MIN_DIFFICULTY: f64 = 1.0;
pub const MAX_DIFFICULTY: f64 = 10.0;
pub const MAX_STABILITY: f64 = 36_500.0;

/// Intervals shorter than this are never fuzzed
const FUZZ_MIN_INTERVAL: f64 = 2.5;

pub const DEFAULT_WEIGHTS: [f64; 19] = [
    0.40255, 1.18385, 3.173, 15.69105, 7.1949, 0.5345, 1.4604, 0.0046, 1.54575, 0.1192, 1.01925,
    1.9395, 0.11, 0.29605, 2.2698, 0.2315, 2.9898, 0.51655, 0.6621,
];

/// Constants of the memory model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameters {
    /// w0..w3 initial stability per grade, w4..w7 difficulty, w8..w10
    /// recall growth, w11..w14 lapse, w15/w16 hard penalty and easy bonus,
    /// w17/w18 same-day reviews
    pub weights: [f64; 19],
    /// Retrievability the next review is scheduled for
    pub desired_retention: f64,
    /// Upper bound on any interval, in days
    pub maximum_interval: u32,
    /// Floor applied to every stability the model produces
    pub minimum_stability: f64,
    /// Relative spread of the random interval perturbation (0 disables it)
    pub fuzz_factor: f64,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            weights: DEFAULT_WEIGHTS,
            desired_retention: 0.9,
            maximum_interval: 36_500,
            minimum_stability: 0.01,
            fuzz_factor: 0.05,
        }
    }
}

impl Parameters {
    /// Same parameters with fuzz turned off
    pub fn without_fuzz(&self) -> Self {
        Self {
            fuzz_factor: 0.0,
            ..self.clone()
        }
    }

    fn w(&self, i: usize) -> f64 {
        self.weights[i]
    }
}

/// Stability and difficulty of a card
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryState {
    pub stability: f64,
    pub difficulty: f64,
}

impl MemoryState {
    pub fn is_finite(&self) -> bool {
        self.stability.is_finite() && self.difficulty.is_finite()
    }
}

/// Result of scheduling one review
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReviewOutcome {
    pub state: MemoryState,
    pub interval: u32,
    pub due: NaiveDate,
}

/// Probability of recall `elapsed_days` after a review.
///
/// Negative elapsed time counts as zero; stability is floored at
/// `f64::MIN_POSITIVE` so the ratio stays finite.
pub fn retrievability(stability: f64, elapsed_days: f64) -> f64 {
    let t = elapsed_days.max(0.0);
    let s = stability.max(f64::MIN_POSITIVE);
    (1.0 + FACTOR * (t / s)).powf(DECAY)
}

/// Unrounded days until retrievability falls to the desired retention
pub fn optimal_interval(params: &Parameters, stability: f64) -> f64 {
    (stability / FACTOR) * (params.desired_retention.powf(1.0 / DECAY) - 1.0)
}

/// State of a card after its very first review
pub fn initial_state(params: &Parameters, grade: Grade) -> MemoryState {
    let stability = match grade {
        Grade::Again => params.w(0),
        Grade::Hard => params.w(1),
        Grade::Good => params.w(2),
        Grade::Easy => params.w(3),
    };
    MemoryState {
        stability: clamp_stability(params, stability),
        difficulty: initial_difficulty(params, grade),
    }
}

/// State of a reviewed card after another review `elapsed_days` later.
///
/// Reviews on the same day as the previous one use the short-term update.
pub fn next_state(
    params: &Parameters,
    prev: MemoryState,
    elapsed_days: f64,
    grade: Grade,
) -> MemoryState {
    let elapsed_days = elapsed_days.max(0.0);
    let difficulty = next_difficulty(params, prev.difficulty, grade);
    let stability = if elapsed_days < 1.0 {
        short_term_stability(params, prev.stability, grade)
    } else {
        let r = retrievability(prev.stability, elapsed_days);
        match grade {
            Grade::Again => lapse_stability(params, prev.difficulty, prev.stability, r),
            _ => recall_stability(params, prev.difficulty, prev.stability, r, grade),
        }
    };
    MemoryState {
        stability: clamp_stability(params, stability),
        difficulty,
    }
}

/// Days until the next review for a card with `stability`
pub fn next_interval<R: Rng + ?Sized>(params: &Parameters, stability: f64, rng: &mut R) -> u32 {
    let max = f64::from(params.maximum_interval.max(1));
    let interval = optimal_interval(params, stability).round().clamp(1.0, max);
    fuzz_interval(params, interval, rng).clamp(1.0, max) as u32
}

/// Schedule the first review of a new card
pub fn schedule_first_review<R: Rng + ?Sized>(
    params: &Parameters,
    grade: Grade,
    today: NaiveDate,
    rng: &mut R,
) -> ReviewOutcome {
    let state = initial_state(params, grade);
    outcome(params, state, today, rng)
}

/// Schedule a review of a card last reviewed on `last_review`
pub fn schedule_review<R: Rng + ?Sized>(
    params: &Parameters,
    prev: MemoryState,
    last_review: NaiveDate,
    grade: Grade,
    today: NaiveDate,
    rng: &mut R,
) -> ReviewOutcome {
    let elapsed_days = (today - last_review).num_days().max(0) as f64;
    let state = next_state(params, prev, elapsed_days, grade);
    outcome(params, state, today, rng)
}

fn outcome<R: Rng + ?Sized>(
    params: &Parameters,
    state: MemoryState,
    today: NaiveDate,
    rng: &mut R,
) -> ReviewOutcome {
    let interval = next_interval(params, state.stability, rng);
    let due = today
        .checked_add_days(Days::new(u64::from(interval)))
        .unwrap_or(NaiveDate::MAX);
    log::debug!(
        "scheduled S={:.4} D={:.4} interval={}d due={}",
        state.stability,
        state.difficulty,
        interval,
        due
    );
    ReviewOutcome {
        state,
        interval,
        due,
    }
}

/// Calculate the interval each grade would give, without fuzz.
/// Used to show the learner what each rating means for this card.
pub fn preview_intervals(
    params: &Parameters,
    prev: Option<(MemoryState, NaiveDate)>,
    today: NaiveDate,
) -> [u32; 4] {
    let params = params.without_fuzz();
    let mut rng = StdRng::seed_from_u64(0);
    Grade::ALL.map(|grade| {
        let outcome = match prev {
            None => schedule_first_review(&params, grade, today, &mut rng),
            Some((state, last_review)) => {
                schedule_review(&params, state, last_review, grade, today, &mut rng)
            }
        };
        outcome.interval
    })
}

fn initial_difficulty(params: &Parameters, grade: Grade) -> f64 {
    clamp_difficulty(params.w(4) - f64::exp(params.w(5) * (grade.value() - 1.0)) + 1.0)
}

fn next_difficulty(params: &Parameters, d: f64, grade: Grade) -> f64 {
    let delta = -params.w(6) * (grade.value() - 3.0);
    // Linear damping: steps shrink as difficulty nears the ceiling
    let damped = d + delta * ((MAX_DIFFICULTY - d) / (MAX_DIFFICULTY - MIN_DIFFICULTY));
    let reverted = params.w(7) * initial_difficulty(params, Grade::Easy) + (1.0 - params.w(7)) * damped;
    clamp_difficulty(reverted)
}

fn recall_stability(params: &Parameters, d: f64, s: f64, r: f64, grade: Grade) -> f64 {
    let t_d = 11.0 - d;
    let t_s = s.powf(-params.w(9));
    let t_r = f64::exp(params.w(10) * (1.0 - r)) - 1.0;
    let hard = if grade == Grade::Hard { params.w(15) } else { 1.0 };
    let easy = if grade == Grade::Easy { params.w(16) } else { 1.0 };
    let alpha = 1.0 + t_d * t_s * t_r * hard * easy * f64::exp(params.w(8));
    s * alpha
}

fn lapse_stability(params: &Parameters, d: f64, s: f64, r: f64) -> f64 {
    let d_f = d.powf(-params.w(12));
    let s_f = (s + 1.0).powf(params.w(13)) - 1.0;
    let r_f = f64::exp(params.w(14) * (1.0 - r));
    let lapsed = params.w(11) * d_f * s_f * r_f;
    lapsed.min(s)
}

fn short_term_stability(params: &Parameters, s: f64, grade: Grade) -> f64 {
    s * f64::exp(params.w(17) * (grade.value() - 3.0 + params.w(18)))
}

/// Clamp: stability stays within [minimum_stability, MAX_STABILITY].
/// NaN passes through unchanged and is rejected by the caller.
fn clamp_stability(params: &Parameters, s: f64) -> f64 {
    s.clamp(params.minimum_stability, MAX_STABILITY)
}

/// Clamp: difficulty stays within [MIN_DIFFICULTY, MAX_DIFFICULTY].
fn clamp_difficulty(d: f64) -> f64 {
    d.clamp(MIN_DIFFICULTY, MAX_DIFFICULTY)
}

fn fuzz_interval<R: Rng + ?Sized>(params: &Parameters, interval: f64, rng: &mut R) -> f64 {
    if params.fuzz_factor <= 0.0 || interval < FUZZ_MIN_INTERVAL {
        return interval;
    }
    let lo = (interval * (1.0 - params.fuzz_factor)).round().max(1.0) as u32;
    let hi = (interval * (1.0 + params.fuzz_factor)).round() as u32;
    if hi <= lo {
        return interval;
    }
    f64::from(rng.gen_range(lo..=hi))
}

/// Format an interval in days to a human-readable string
pub fn format_interval(days: u32) -> String {
    if days == 0 {
        "now".to_string()
    } else if days < 7 {
        format!("{}d", days)
    } else if days < 30 {
        format!("{}w", days / 7)
    } else if days < 365 {
        format!("{}mo", days / 30)
    } else {
        format!("{}y", days / 365)
    }
}
