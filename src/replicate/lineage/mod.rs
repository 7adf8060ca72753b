use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::Open01;

use crate::FatemapError;
use population::{Name, Population};
use trajectory::{Sample, Trajectory};
use transition::Transition;

pub mod population;
pub mod trajectory;
pub mod transition;

/// Subtype index of stem cells in the canonical fate mapping model
pub const STEM: usize = 0;
/// Subtype index of progenitor cells in the canonical fate mapping model
pub const PROGENITOR: usize = 1;

/// The named scalar rates of the stem/progenitor lineage process. Immutable
/// for the lifetime of one simulation run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateParameters {
    /// Rate at which a stem cell divides asymmetrically, keeping itself and
    /// producing one progenitor cell
    pub asymmetric_division: f64,
    /// Per cell turnover rate of progenitor cells, split between symmetric
    /// division and death
    pub progenitor_turnover: f64,
    /// Fraction of progenitor turnover events that are symmetric divisions;
    /// the remainder are deaths
    pub symmetric_fraction: f64,
}

/// How a bounded engine run came to a successful stop
///  - StopTimeReached means the next event would have landed past the stop
///    time and was not recorded
///  - Absorbed means every propensity reached zero and no further event can
///    ever fire; the trajectory is valid and complete up to that time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    StopTimeReached,
    Absorbed,
}

/// Data structure representing one stochastic lineage process.
/// - subtypes
///     - the ordered names of the cell subtypes being tracked
/// - transitions
///     - the ordered table of events the population may undergo; the index
///       of the categorical draw maps directly to the delta it applies
///
/// Each model owns its own pseudo random stream so independent replicates
/// never share mutable random state.
#[derive(Clone)]
pub struct LineageModel {
    subtypes: Vec<Name>,
    transitions: Vec<Transition>,
    prng: StdRng,
    seed: [u8; 32],
}

impl LineageModel {
    /// Builds a new model from a subtype list and a transition table.
    ///
    /// Fails fast with InvalidConfiguration before any simulation work if a
    /// delta's dimensionality does not match the subtype list, a source
    /// index is out of range, or a rate is negative or not finite.
    pub fn new(subtypes: Vec<Name>, transitions: Vec<Transition>) -> Result<Self, FatemapError> {
        if subtypes.is_empty() {
            return Err(FatemapError::InvalidConfiguration(
                "a lineage model must track at least one subtype".to_string(),
            ));
        }

        for transition in &transitions {
            if transition.get_delta().len() != subtypes.len() {
                return Err(FatemapError::InvalidConfiguration(format!(
                    "transition delta has {} entries but the model tracks {} subtypes",
                    transition.get_delta().len(),
                    subtypes.len()
                )));
            }
            if transition.get_source() >= subtypes.len() {
                return Err(FatemapError::InvalidConfiguration(format!(
                    "transition source index {} is out of range for {} subtypes",
                    transition.get_source(),
                    subtypes.len()
                )));
            }
            let rate = transition.get_per_capita_rate();
            if !rate.is_finite() || rate < 0.0 {
                return Err(FatemapError::InvalidConfiguration(format!(
                    "transition rate {} is not a finite non-negative value",
                    rate
                )));
            }
        }

        let seed: [u8; 32] = rand::random();
        let prng = StdRng::from_seed(seed);

        return Ok(Self {
            subtypes,
            transitions,
            prng,
            seed,
        });
    }

    /// Builds the canonical stem/progenitor fate mapping model:
    ///  - a stem cell divides asymmetrically and gains one progenitor
    ///  - a progenitor cell divides symmetrically and gains one progenitor
    ///  - a progenitor cell dies and loses one progenitor
    pub fn stem_progenitor(params: RateParameters) -> Result<Self, FatemapError> {
        if !params.symmetric_fraction.is_finite()
            || params.symmetric_fraction < 0.0
            || params.symmetric_fraction > 1.0
        {
            return Err(FatemapError::InvalidConfiguration(format!(
                "symmetric fraction {} must lie within [0, 1]",
                params.symmetric_fraction
            )));
        }

        let subtypes = vec![
            Name("stem".to_string()),
            Name("progenitor".to_string()),
        ];
        let transitions = vec![
            Transition::new(STEM, params.asymmetric_division, vec![0, 1]),
            Transition::new(
                PROGENITOR,
                params.symmetric_fraction * params.progenitor_turnover,
                vec![0, 1],
            ),
            Transition::new(
                PROGENITOR,
                (1.0 - params.symmetric_fraction) * params.progenitor_turnover,
                vec![0, -1],
            ),
        ];

        return Self::new(subtypes, transitions);
    }

    /// sets prng to some prng based on seed
    pub fn with_seed(mut self, seed: [u8; 32]) -> Self {
        self.seed = seed;
        self.prng = StdRng::from_seed(seed);
        self
    }

    /// returns a reference to the current seed value
    pub fn get_seed(&self) -> &[u8; 32] {
        &self.seed
    }

    /// Returns a reference to the ordered subtype names
    pub fn get_subtypes(&self) -> &Vec<Name> {
        return &self.subtypes;
    }

    /// Returns a reference to the ordered transition table
    pub fn get_transitions(&self) -> &Vec<Transition> {
        return &self.transitions;
    }

    /// Computes the instantaneous rate of every transition given the current
    /// population, in table order. Pure; no side effects. All entries are
    /// zero exactly when no subtype that could fire has any cells left.
    pub fn propensities(&self, population: &Population) -> Vec<f64> {
        let mut rates = Vec::with_capacity(self.transitions.len());
        for transition in &self.transitions {
            rates.push(transition.propensity(population));
        }
        return rates;
    }

    /// Randomly selects which transition happens next, weighted by each
    /// transition's share of the total propensity
    fn select_event(&mut self, propensities: &[f64], total_rate: f64) -> usize {
        let mut remainder = self.prng.gen::<f64>() * total_rate;

        for (index, rate) in propensities.iter().enumerate() {
            if *rate > remainder {
                return index;
            }
            remainder -= rate;
        }

        // rounding in the subtraction walk can exhaust the loop; fall back
        // to the last transition that can actually fire
        return propensities
            .iter()
            .rposition(|rate| *rate > 0.0)
            .unwrap_or(0);
    }

    /// Draws an exponential waiting time with the given total rate
    fn draw_waiting_time(&mut self, total_rate: f64) -> f64 {
        let uniform: f64 = self.prng.sample(Open01);
        return -(1.0 - uniform).ln() / total_rate;
    }

    /// Runs the Gillespie loop over one bounded time interval.
    ///
    /// Starting from the seed population at start_time, repeatedly draws an
    /// exponential waiting time with rate equal to the total propensity and
    /// one categorical event index weighted by the individual propensities,
    /// then advances time, applies the event's delta, and records a sample.
    ///
    /// Stops successfully when the next event would land past stop_time
    /// (that event is never recorded, so the returned trajectory's final
    /// time is always <= stop_time) or when every propensity reaches zero.
    /// Reports CapacityExceeded once max_samples samples are recorded and
    /// the process still has events left to fire, so the caller can re-run
    /// with a larger bound instead of receiving a silently short trajectory.
    pub fn run_interval(
        &mut self,
        start_time: f64,
        stop_time: f64,
        seed_population: Population,
        max_samples: usize,
    ) -> Result<(Trajectory, StopReason), FatemapError> {
        if !start_time.is_finite() || !stop_time.is_finite() || stop_time < start_time {
            return Err(FatemapError::InvalidConfiguration(format!(
                "invalid simulation interval [{}, {}]",
                start_time, stop_time
            )));
        }
        if seed_population.dimension() != self.subtypes.len() {
            return Err(FatemapError::InvalidConfiguration(format!(
                "seed population has {} entries but the model tracks {} subtypes",
                seed_population.dimension(),
                self.subtypes.len()
            )));
        }
        if max_samples == 0 {
            return Err(FatemapError::InvalidConfiguration(
                "sample capacity must allow at least the initial sample".to_string(),
            ));
        }

        let mut time = start_time;
        let mut population = seed_population;
        let mut trajectory = Trajectory::new();
        trajectory.push(Sample::new(time, population.clone()));

        loop {
            let propensities = self.propensities(&population);
            let total_rate: f64 = propensities.iter().sum();

            if total_rate <= 0.0 {
                return Ok((trajectory, StopReason::Absorbed));
            }
            if trajectory.len() >= max_samples {
                return Err(FatemapError::CapacityExceeded {
                    samples: trajectory.len(),
                });
            }

            time += self.draw_waiting_time(total_rate);
            if time > stop_time {
                return Ok((trajectory, StopReason::StopTimeReached));
            }

            let event = self.select_event(&propensities, total_rate);
            population.apply(&self.transitions[event])?;
            trajectory.push(Sample::new(time, population.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paper_params() -> RateParameters {
        RateParameters {
            asymmetric_division: 0.07,
            progenitor_turnover: 0.7,
            symmetric_fraction: 0.5,
        }
    }

    #[test]
    fn stem_progenitor_propensities_match_the_model() {
        let model = LineageModel::stem_progenitor(paper_params()).unwrap();

        let rates = model.propensities(&Population::new(vec![1, 0]));
        assert_eq!(rates, vec![0.07, 0.0, 0.0]);

        let rates = model.propensities(&Population::new(vec![2, 10]));
        assert_eq!(
            rates,
            vec![0.07 * 2.0, (0.5 * 0.7) * 10.0, ((1.0 - 0.5) * 0.7) * 10.0]
        );
    }

    #[test]
    fn mismatched_delta_dimensions_are_rejected() {
        let result = LineageModel::new(
            vec![Name("stem".to_string()), Name("progenitor".to_string())],
            vec![Transition::new(0, 1.0, vec![0, 1, -1])],
        );

        assert!(matches!(
            result,
            Err(FatemapError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn out_of_range_source_index_is_rejected() {
        let result = LineageModel::new(
            vec![Name("stem".to_string())],
            vec![Transition::new(1, 1.0, vec![0])],
        );

        assert!(matches!(
            result,
            Err(FatemapError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn empty_population_halts_as_absorbed_before_stop_time() {
        let mut model = LineageModel::stem_progenitor(paper_params())
            .unwrap()
            .with_seed([3u8; 32]);

        let (trajectory, reason) = model
            .run_interval(0.0, 500.0, Population::new(vec![0, 0]), 10_000)
            .unwrap();

        assert_eq!(reason, StopReason::Absorbed);
        assert_eq!(trajectory.len(), 1);
        assert_eq!(trajectory.last().unwrap().get_time(), 0.0);
    }

    #[test]
    fn runs_with_the_same_seed_are_bit_identical() {
        let seed = [11u8; 32];
        let mut first = LineageModel::stem_progenitor(paper_params())
            .unwrap()
            .with_seed(seed);
        let mut second = LineageModel::stem_progenitor(paper_params())
            .unwrap()
            .with_seed(seed);

        let (trajectory_a, reason_a) = first
            .run_interval(0.0, 500.0, Population::new(vec![1, 0]), 100_000)
            .unwrap();
        let (trajectory_b, reason_b) = second
            .run_interval(0.0, 500.0, Population::new(vec![1, 0]), 100_000)
            .unwrap();

        assert_eq!(reason_a, reason_b);
        assert_eq!(trajectory_a, trajectory_b);
    }

    #[test]
    fn capacity_of_one_is_reported_immediately_when_events_remain() {
        let mut model = LineageModel::stem_progenitor(paper_params())
            .unwrap()
            .with_seed([5u8; 32]);

        let result = model.run_interval(0.0, 500.0, Population::new(vec![1, 0]), 1);

        assert!(matches!(
            result,
            Err(FatemapError::CapacityExceeded { samples: 1 })
        ));
    }

    #[test]
    fn paper_scenario_stays_in_bounds_with_strictly_increasing_times() {
        let mut model = LineageModel::stem_progenitor(paper_params())
            .unwrap()
            .with_seed([42u8; 32]);

        let (trajectory, reason) = model
            .run_interval(0.0, 500.0, Population::new(vec![1, 0]), 100_000)
            .unwrap();

        assert_eq!(trajectory.get_samples()[0].get_time(), 0.0);
        assert!(trajectory.last().unwrap().get_time() <= 500.0);
        assert_eq!(reason, StopReason::StopTimeReached);

        for pair in trajectory.get_samples().windows(2) {
            assert!(pair[1].get_time() > pair[0].get_time());
        }

        // the stem count is untouched by every transition in this model
        for sample in trajectory.get_samples() {
            assert_eq!(sample.get_population().get(STEM), 1);
        }
    }

    #[test]
    fn a_delta_that_would_underflow_is_surfaced() {
        let mut model = LineageModel::new(
            vec![Name("stem".to_string()), Name("progenitor".to_string())],
            vec![Transition::new(STEM, 1.0, vec![-2, 0])],
        )
        .unwrap()
        .with_seed([9u8; 32]);

        let result = model.run_interval(0.0, 1.0e9, Population::new(vec![1, 0]), 1_000);

        assert!(matches!(
            result,
            Err(FatemapError::NegativePopulation { subtype: STEM })
        ));
    }
}
