use std::sync::mpsc::SyncSender;

use lineage::trajectory::Trajectory;
use lineage::LineageModel;
use passage::PassagePlan;
use results::ReplicateResult;

use crate::FatemapError;

pub mod lineage;
pub mod passage;
pub mod results;

/// Object specifying return granularity for a replicate
///  - Minimal returns only the completed (or failed) replicate
///  - Full additionally returns every stitched passage segment
#[derive(Clone)]
pub enum ReplicateReturn {
    Minimal(SyncSender<ReplicateResult>),
    Full(SyncSender<ReplicateResult>),
}

/// The runtime environment for a single ensemble member. Once the object has
/// been initialized the simulate method may be called on it in order to run
/// one full passage plan on its own random stream.
pub struct Replicate {
    model: LineageModel,
    plan: PassagePlan,
    segment_capacity: usize,
    id: usize,
    replicate_return: ReplicateReturn,
}

impl Replicate {
    pub fn from(
        model: LineageModel,
        plan: PassagePlan,
        segment_capacity: usize,
        id: usize,
        replicate_return: ReplicateReturn,
    ) -> Self {
        Self {
            model,
            plan,
            segment_capacity,
            id,
            replicate_return,
        }
    }

    /// Runs the passage plan and sends the requested data back over the
    /// replicate's return channel. A failure is reported as a result value;
    /// it never tears down sibling replicates.
    pub fn simulate(&mut self) {
        match self.replicate_return.clone() {
            // behavior if minimal return behavior selected
            ReplicateReturn::Minimal(return_sender) => {
                let message = match self.run_plan(None) {
                    Ok(trajectory) => ReplicateResult::CompletedTrajectory(trajectory, self.id),
                    Err(error) => ReplicateResult::Failed(error, self.id),
                };
                return_sender
                    .send(message)
                    .expect("Receiver thread for replicate dropped\nShutting down...");
            }

            // behavior if full per segment return selected
            ReplicateReturn::Full(return_sender) => {
                let message = match self.run_plan(Some(&return_sender)) {
                    Ok(trajectory) => ReplicateResult::CompletedTrajectory(trajectory, self.id),
                    Err(error) => ReplicateResult::Failed(error, self.id),
                };
                return_sender
                    .send(message)
                    .expect("Receiver thread for replicate dropped\nShutting down...");
            }
        }
    }

    /// Runs every segment of the passage plan end to end and returns the
    /// concatenated trajectory.
    ///
    /// Each segment is seeded per the plan's policy (carry-over counts are
    /// read from the tail of the trajectory stitched so far), simulated over
    /// its checkpoint interval, and appended without the duplicate boundary
    /// sample. If any segment exhausts its sample capacity the whole run
    /// fails, since later segments would otherwise be seeded from an
    /// incomplete end state.
    pub fn run_passages(&mut self) -> Result<Trajectory, FatemapError> {
        return self.run_plan(None);
    }

    fn run_plan(
        &mut self,
        notify: Option<&SyncSender<ReplicateResult>>,
    ) -> Result<Trajectory, FatemapError> {
        let mut combined = Trajectory::new();

        for segment in 0..self.plan.segment_count() {
            let (start_time, stop_time) = self.plan.interval(segment);
            let seed_population = self.plan.seed_population(segment, combined.last())?;

            let (segment_trajectory, _reason) = self.model.run_interval(
                start_time,
                stop_time,
                seed_population,
                self.segment_capacity,
            )?;

            if let Some(sender) = notify {
                sender
                    .send(ReplicateResult::SegmentComplete(
                        segment_trajectory.clone(),
                        self.id,
                        segment,
                    ))
                    .expect("Receiver thread for replicate dropped\nShutting down...");
            }

            combined.append(segment_trajectory);
        }

        return Ok(combined);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc::sync_channel;

    use super::lineage::population::Population;
    use super::lineage::{RateParameters, LineageModel, PROGENITOR, STEM};
    use super::passage::{PassagePlan, SeedPolicy, SubtypeSeed};
    use super::*;

    fn paper_params() -> RateParameters {
        RateParameters {
            asymmetric_division: 0.07,
            progenitor_turnover: 0.7,
            symmetric_fraction: 0.5,
        }
    }

    fn paper_plan() -> PassagePlan {
        PassagePlan::new(
            vec![0.0, 500.0, 1000.0, 1500.0],
            vec![
                SeedPolicy::Explicit(Population::new(vec![1, 0])),
                SeedPolicy::Reseed(vec![SubtypeSeed::Fixed(1), SubtypeSeed::CarryOver]),
                SeedPolicy::Reseed(vec![SubtypeSeed::Fixed(1), SubtypeSeed::CarryOver]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn single_segment_plan_matches_a_direct_engine_run() {
        let seed = [21u8; 32];
        let model = LineageModel::stem_progenitor(paper_params()).unwrap();
        let plan = PassagePlan::single(0.0, 500.0, Population::new(vec![1, 0])).unwrap();

        let (sender, _receiver) = sync_channel(8);
        let mut replicate = Replicate::from(
            model.clone().with_seed(seed),
            plan,
            100_000,
            0,
            ReplicateReturn::Minimal(sender),
        );
        let stitched = replicate.run_passages().unwrap();

        let (direct, _reason) = model
            .with_seed(seed)
            .run_interval(0.0, 500.0, Population::new(vec![1, 0]), 100_000)
            .unwrap();

        assert_eq!(stitched, direct);
    }

    #[test]
    fn passages_reset_stem_and_carry_progenitor_across_checkpoints() {
        let (sender, _receiver) = sync_channel(8);
        let mut replicate = Replicate::from(
            LineageModel::stem_progenitor(paper_params())
                .unwrap()
                .with_seed([17u8; 32]),
            paper_plan(),
            100_000,
            0,
            ReplicateReturn::Minimal(sender),
        );

        let trajectory = replicate.run_passages().unwrap();
        let samples = trajectory.get_samples();

        assert_eq!(samples[0].get_time(), 0.0);
        assert!(trajectory.last().unwrap().get_time() <= 1500.0);
        for pair in samples.windows(2) {
            assert!(pair[1].get_time() > pair[0].get_time());
        }

        for checkpoint in [500.0, 1000.0] {
            let boundary = samples
                .iter()
                .position(|sample| sample.get_time() == checkpoint)
                .expect("a reseeded sample is recorded exactly at each checkpoint");

            // stem resets to the reinjected count while progenitor persists
            assert_eq!(samples[boundary].get_population().get(STEM), 1);
            assert_eq!(
                samples[boundary].get_population().get(PROGENITOR),
                samples[boundary - 1].get_population().get(PROGENITOR)
            );
        }
    }

    #[test]
    fn unordered_checkpoints_are_rejected() {
        let result = PassagePlan::new(
            vec![0.0, 500.0, 400.0],
            vec![
                SeedPolicy::Explicit(Population::new(vec![1, 0])),
                SeedPolicy::Explicit(Population::new(vec![1, 0])),
            ],
        );

        assert!(matches!(
            result,
            Err(FatemapError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn carry_over_in_the_first_segment_is_rejected() {
        let result = PassagePlan::new(
            vec![0.0, 500.0],
            vec![SeedPolicy::Reseed(vec![
                SubtypeSeed::Fixed(1),
                SubtypeSeed::CarryOver,
            ])],
        );

        assert!(matches!(
            result,
            Err(FatemapError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn a_segment_capacity_failure_fails_the_whole_passage_run() {
        let (sender, _receiver) = sync_channel(8);
        let mut replicate = Replicate::from(
            LineageModel::stem_progenitor(paper_params())
                .unwrap()
                .with_seed([29u8; 32]),
            paper_plan(),
            1,
            0,
            ReplicateReturn::Minimal(sender),
        );

        assert!(matches!(
            replicate.run_passages(),
            Err(FatemapError::CapacityExceeded { .. })
        ));
    }
}
