use crate::FatemapError;
use super::lineage::population::Population;
use super::lineage::trajectory::Sample;

/// How one subtype is seeded at the start of a passage segment
///  - Fixed reintroduces an exact number of cells
///  - CarryOver keeps the count this subtype had at the end of the previous
///    segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubtypeSeed {
    Fixed(u64),
    CarryOver,
}

/// The seed population policy for one passage segment.
///
/// Explicit restarts the segment from a full population vector. Reseed mixes
/// fixed reintroduced counts with counts carried over from the previous
/// segment's final sample, which models reinjecting a fixed number of stem
/// cells together with the surviving progeny.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeedPolicy {
    Explicit(Population),
    Reseed(Vec<SubtypeSeed>),
}

/// An ordered series of passage checkpoint times plus one seed policy per
/// resulting segment. Consumed read-only by each replicate; never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct PassagePlan {
    checkpoints: Vec<f64>,
    seeds: Vec<SeedPolicy>,
}

impl PassagePlan {
    /// Builds a plan from checkpoint times and per segment seed policies.
    ///
    /// Fails fast with InvalidConfiguration if fewer than two checkpoints
    /// are given, the checkpoint times are not finite and strictly
    /// increasing, the number of policies does not match the number of
    /// segments, or the first segment asks to carry over from a segment
    /// that does not exist.
    pub fn new(checkpoints: Vec<f64>, seeds: Vec<SeedPolicy>) -> Result<Self, FatemapError> {
        if checkpoints.len() < 2 {
            return Err(FatemapError::InvalidConfiguration(
                "a passage plan needs at least two checkpoint times".to_string(),
            ));
        }
        for pair in checkpoints.windows(2) {
            if !pair[0].is_finite() || !pair[1].is_finite() || pair[1] <= pair[0] {
                return Err(FatemapError::InvalidConfiguration(format!(
                    "checkpoint times must be finite and strictly increasing, got {} then {}",
                    pair[0], pair[1]
                )));
            }
        }
        if seeds.len() != checkpoints.len() - 1 {
            return Err(FatemapError::InvalidConfiguration(format!(
                "{} checkpoints define {} segments but {} seed policies were given",
                checkpoints.len(),
                checkpoints.len() - 1,
                seeds.len()
            )));
        }
        if let Some(SeedPolicy::Reseed(_)) = seeds.first() {
            return Err(FatemapError::InvalidConfiguration(
                "the first segment has no previous segment to carry counts over from".to_string(),
            ));
        }

        return Ok(Self { checkpoints, seeds });
    }

    /// Builds the degenerate single segment plan covering one interval
    pub fn single(
        start_time: f64,
        stop_time: f64,
        seed_population: Population,
    ) -> Result<Self, FatemapError> {
        return Self::new(
            vec![start_time, stop_time],
            vec![SeedPolicy::Explicit(seed_population)],
        );
    }

    /// Returns the number of segments in the plan
    pub fn segment_count(&self) -> usize {
        return self.checkpoints.len() - 1;
    }

    /// Returns the (start, stop) checkpoint pair bounding a segment
    pub fn interval(&self, segment: usize) -> (f64, f64) {
        return (self.checkpoints[segment], self.checkpoints[segment + 1]);
    }

    /// Materializes the seed population for a segment, reading carried over
    /// counts from the previous segment's final sample
    pub fn seed_population(
        &self,
        segment: usize,
        previous_tail: Option<&Sample>,
    ) -> Result<Population, FatemapError> {
        match &self.seeds[segment] {
            SeedPolicy::Explicit(population) => return Ok(population.clone()),

            SeedPolicy::Reseed(entries) => {
                let tail = match previous_tail {
                    Some(sample) => sample.get_population(),
                    None => {
                        return Err(FatemapError::InvalidConfiguration(
                            "carry-over seed requested without a previous segment".to_string(),
                        ))
                    }
                };
                if entries.len() != tail.dimension() {
                    return Err(FatemapError::InvalidConfiguration(format!(
                        "reseed policy has {} entries but the population tracks {} subtypes",
                        entries.len(),
                        tail.dimension()
                    )));
                }

                let mut counts = Vec::with_capacity(entries.len());
                for (subtype, entry) in entries.iter().enumerate() {
                    match entry {
                        SubtypeSeed::Fixed(count) => counts.push(*count),
                        SubtypeSeed::CarryOver => counts.push(tail.get(subtype)),
                    }
                }

                return Ok(Population::new(counts));
            }
        }
    }
}
