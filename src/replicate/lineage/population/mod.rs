use std::fmt::Display;

use crate::FatemapError;
use super::transition::Transition;

/// Tuple struct wrapper around name data for a cell subtype
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Debug)]
pub struct Name(pub String);

/// Tuple struct wrapper around count data for a cell subtype
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Debug)]
pub struct Count(pub u64);

/// An ordered vector of cell counts, one entry per subtype, which may be
/// mutated over time by having Transition objects applied to it via the
/// .apply method. Counts are unsigned so a population can never hold a
/// negative value; a transition that would drive a count below zero is
/// reported as an error instead.
#[derive(Eq, PartialEq, Clone, Debug)]
pub struct Population {
    counts: Vec<Count>,
}

impl Population {
    pub fn new(counts: Vec<u64>) -> Self {
        return Self {
            counts: counts.into_iter().map(Count).collect(),
        };
    }

    /// Returns the number of subtypes tracked by this population
    pub fn dimension(&self) -> usize {
        return self.counts.len();
    }

    /// Returns the count for a single subtype
    pub fn get(&self, subtype: usize) -> u64 {
        return self.counts[subtype].0;
    }

    /// Mutates the population to reflect the effects of a transition
    ///
    /// #### Note!
    /// A delta that would drive any subtype below zero indicates a modeling
    /// or rate error and is surfaced as NegativePopulation before any part
    /// of the delta is committed.
    pub fn apply(&mut self, transition: &Transition) -> Result<(), FatemapError> {
        for (subtype, delta) in transition.get_delta().iter().enumerate() {
            if *delta < 0 && self.counts[subtype].0 < delta.unsigned_abs() {
                return Err(FatemapError::NegativePopulation { subtype });
            }
        }

        for (subtype, delta) in transition.get_delta().iter().enumerate() {
            if *delta < 0 {
                self.counts[subtype].0 -= delta.unsigned_abs();
            } else {
                self.counts[subtype].0 += *delta as u64;
            }
        }

        return Ok(());
    }
}

impl Display for Population {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut formatted_string = String::new();
        for count in &self.counts {
            if !formatted_string.is_empty() {
                formatted_string.push(',');
            }
            formatted_string.push_str(&count.0.to_string());
        }

        write!(f, "{}", formatted_string)
    }
}
