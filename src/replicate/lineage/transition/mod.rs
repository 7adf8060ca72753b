use super::population::Population;

/// Represents a single transition event a population may undergo, containing
/// the subtype whose count scales its propensity, a per capita rate, and the
/// state delta applied when the event fires.
///
/// The propensity is first order mass action: rate times the current count
/// of the source subtype. It is therefore zero exactly when the source
/// subtype is extinct, which is what keeps death and differentiation events
/// from firing on an empty population.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    source: usize,
    per_capita_rate: f64,
    delta: Vec<i64>,
}

impl Transition {
    pub fn new(source: usize, per_capita_rate: f64, delta: Vec<i64>) -> Self {
        return Self {
            source,
            per_capita_rate,
            delta,
        };
    }

    /// Returns the index of the subtype whose count scales this transition
    pub fn get_source(&self) -> usize {
        return self.source;
    }

    /// Returns the per capita rate for this transition
    pub fn get_per_capita_rate(&self) -> f64 {
        return self.per_capita_rate;
    }

    /// Returns a reference to the state delta for this transition
    pub fn get_delta(&self) -> &Vec<i64> {
        return &self.delta;
    }

    /// Computes the instantaneous rate of this transition given a population
    pub fn propensity(&self, population: &Population) -> f64 {
        return self.per_capita_rate * population.get(self.source) as f64;
    }
}
