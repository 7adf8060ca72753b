//! # Description
//! This is the standalone stochastic simulation engine for clonal fate
//! mapping experiments. It takes a lineage process model (cell subtypes plus
//! a table of birth, death, and differentiation transitions) together with a
//! passage plan, and simulates the population as a continuous-time Markov
//! jump process using the Gillespie algorithm: exponential waiting times
//! drawn against the total propensity, one categorical event per step.
//!
//! A passage plan splits the simulated interval at fixed checkpoint times
//! and reseeds the population at each one, modeling serial transplantation
//! where a fixed number of stem cells is reinjected together with the
//! surviving progeny. The engine runs a configurable number of independent
//! replicates across worker threads and returns one trajectory per
//! replicate; statistics and plotting are left to the caller.

pub mod replicate;

use std::fmt::Display;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};

use threadpool::ThreadPool;

use replicate::lineage::trajectory::Trajectory;
use replicate::lineage::LineageModel;
use replicate::passage::PassagePlan;
use replicate::results::ReplicateResult;
use replicate::{Replicate, ReplicateReturn};

/// Fatemap error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FatemapError {
    /// A model, plan, or interval was malformed; reported before any
    /// simulation work happens
    InvalidConfiguration(String),
    /// A run recorded its full sample budget before reaching the stop time.
    /// Recoverable by re-running with a larger capacity; never silently
    /// truncated
    CapacityExceeded { samples: usize },
    /// An applied transition would have driven a subtype count below zero,
    /// which indicates a modeling or rate error
    NegativePopulation { subtype: usize },
    /// The replicate was still running when the ensemble hit its wall clock
    /// limit
    Interrupted,
}

impl Display for FatemapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FatemapError::InvalidConfiguration(reason) => {
                write!(f, "invalid configuration: {}", reason)
            }
            FatemapError::CapacityExceeded { samples } => write!(
                f,
                "sample capacity of {} filled before the stop time; re-run with a larger capacity",
                samples
            ),
            FatemapError::NegativePopulation { subtype } => {
                write!(f, "a transition would drive subtype {} below zero", subtype)
            }
            FatemapError::Interrupted => {
                write!(
                    f,
                    "replicate was still running when the ensemble was terminated"
                )
            }
        }
    }
}

impl std::error::Error for FatemapError {}

type ReplicateID = usize;
type SegmentIndex = usize;

/// Fatemap response types
#[derive(Clone, Debug, PartialEq)]
pub enum FatemapResponse {
    SegmentComplete(Trajectory, ReplicateID, SegmentIndex),
    ReplicateComplete(Trajectory, ReplicateID),
    ReplicateFailed(FatemapError, ReplicateID),
    EnsembleResult(Vec<Result<Trajectory, FatemapError>>),
}

#[derive(Clone)]
pub enum FatemapReturn {
    Full(SyncSender<FatemapResponse>),
    Minimal(SyncSender<FatemapResponse>),
}

/// This is a builder object containing defaults and methods for constructing
/// a FatemapEngine object.
pub struct Builder {
    // set externally
    num_replicates: usize,
    max_runtime: Option<u64>,
    segment_capacity: usize,
    base_seed: Option<[u8; 32]>,

    // constructed internally
    computation_threads: ThreadPool,
    computation_threads_sender: SyncSender<ReplicateResult>,
    computation_threads_receiver: Receiver<ReplicateResult>,
    prime_model: LineageModel,
    plan: PassagePlan,
    runtime_return: FatemapReturn,
    runtime_receiver: Receiver<FatemapResponse>,
}

impl Builder {
    /// Builds a new FatemapEngine instance from the given model and passage
    /// plan with default values
    ///
    /// replicates = 100
    /// runtime = unlimited
    /// segment capacity = 100000 samples
    /// base seed = drawn at random when the engine runs
    /// return verbosity = minimal
    pub fn new(prime_model: LineageModel, plan: PassagePlan) -> Self {
        let computation_threads = threadpool::Builder::new()
            .thread_name("FatemapComputeThread".to_string())
            .build();
        let (computation_threads_sender, computation_threads_receiver) = sync_channel(32);
        let (runtime_sender, runtime_receiver) = sync_channel(128);

        Self {
            num_replicates: 100,
            max_runtime: None,
            segment_capacity: 100_000,
            base_seed: None,
            computation_threads,
            computation_threads_sender,
            computation_threads_receiver,
            prime_model,
            plan,
            runtime_return: FatemapReturn::Minimal(runtime_sender),
            runtime_receiver,
        }
    }

    /// Sets the number of independent replicates to a manual value
    pub fn replicates(mut self, count: usize) -> Self {
        self.num_replicates = count;
        self
    }

    /// Sets the maximum wall clock runtime to a manual value
    pub fn runtime(mut self, time: u64) -> Self {
        self.max_runtime = Some(time);
        self
    }

    /// Sets the per segment sample capacity to a manual value
    /// this should only be raised in the case that a run is exiting with
    /// CapacityExceeded
    pub fn capacity(mut self, samples: usize) -> Self {
        self.segment_capacity = samples;
        self
    }

    /// Sets the base seed all replicate random streams are derived from,
    /// making the whole ensemble reproducible
    pub fn seed(mut self, base_seed: [u8; 32]) -> Self {
        self.base_seed = Some(base_seed);
        self
    }

    /// Toggles return verbosity behavior between minimal and full
    pub fn verbose(mut self) -> Self {
        self.runtime_return = match self.runtime_return {
            FatemapReturn::Minimal(sender) => FatemapReturn::Full(sender),
            FatemapReturn::Full(sender) => FatemapReturn::Minimal(sender),
        };

        self
    }

    /// Consumes the builder object and outputs a FatemapEngine object
    pub fn build(self) -> (FatemapEngine, Receiver<FatemapResponse>) {
        let runtime = FatemapEngine {
            num_replicates: self.num_replicates,
            max_runtime: self.max_runtime,
            segment_capacity: self.segment_capacity,
            base_seed: self.base_seed,
            computation_threads: self.computation_threads,
            computation_threads_sender: self.computation_threads_sender,
            computation_threads_receiver: self.computation_threads_receiver,
            prime_model: self.prime_model,
            plan: self.plan,
            runtime_return: self.runtime_return,
        };

        return (runtime, self.runtime_receiver);
    }
}

/// Main backend runtime object for the fate mapping engine
pub struct FatemapEngine {
    // set externally
    num_replicates: usize,
    max_runtime: Option<u64>,
    segment_capacity: usize,
    base_seed: Option<[u8; 32]>,

    // constructed internally
    computation_threads: ThreadPool,
    computation_threads_sender: SyncSender<ReplicateResult>,
    computation_threads_receiver: Receiver<ReplicateResult>,
    prime_model: LineageModel,
    plan: PassagePlan,
    runtime_return: FatemapReturn,
}

impl FatemapEngine {
    /// Simulates the whole ensemble and returns one trajectory result per
    /// replicate, ordered by replicate id.
    ///
    /// Every replicate runs the same model and passage plan on its own
    /// worker thread with an independently derived random stream, so a
    /// failed replicate is reported in its slot without aborting siblings.
    pub fn run(&self) -> Result<FatemapResponse, FatemapError> {
        // one result slot per replicate, filled as workers report back
        let mut outcomes: Vec<Option<Result<Trajectory, FatemapError>>> =
            (0..self.num_replicates).map(|_| None).collect();

        // setup loop variables
        let mut replicates_received = 0;
        let mut replicates_created = 0;

        // start runtime timer
        let (timer_sender, timer_receiver) = sync_channel(0);
        if let Some(time) = self.max_runtime {
            self.computation_threads
                .execute(move || Self::engine_runtime_timer(time, timer_sender));
        }

        // setup replicate return object
        let replicate_return = match self.runtime_return {
            FatemapReturn::Minimal(_) => {
                ReplicateReturn::Minimal(self.computation_threads_sender.clone())
            }
            FatemapReturn::Full(_) => {
                ReplicateReturn::Full(self.computation_threads_sender.clone())
            }
        };

        let base_seed = self.base_seed.unwrap_or_else(rand::random);
        while replicates_created < self.num_replicates {
            let model = self
                .prime_model
                .clone()
                .with_seed(Self::replicate_seed(base_seed, replicates_created));
            let mut current_replicate = Replicate::from(
                model,
                self.plan.clone(),
                self.segment_capacity,
                replicates_created,
                replicate_return.clone(),
            );
            self.computation_threads
                .execute(move || current_replicate.simulate());
            replicates_created += 1;
        }

        // poll for replicate results
        while replicates_received < self.num_replicates {
            if let Ok(result) = self.computation_threads_receiver.try_recv() {
                match &self.runtime_return {
                    FatemapReturn::Minimal(sender) => match result {
                        ReplicateResult::CompletedTrajectory(trajectory, id) => {
                            replicates_received += 1;
                            println!(
                                "Replicate {} complete with {} samples",
                                id,
                                trajectory.len()
                            );
                            outcomes[id] = Some(Ok(trajectory.clone()));
                            sender.send(FatemapResponse::ReplicateComplete(trajectory, id))
                                .expect("Fatal Error: frontend cannot be found by FatemapEngine. Please ensure the receiver is not dropped prematurely");
                        }
                        ReplicateResult::Failed(error, id) => {
                            replicates_received += 1;
                            println!("Replicate {} failed: {}", id, error);
                            outcomes[id] = Some(Err(error.clone()));
                            sender.send(FatemapResponse::ReplicateFailed(error, id))
                                .expect("Fatal Error: frontend cannot be found by FatemapEngine. Please ensure the receiver is not dropped prematurely");
                        }
                        ReplicateResult::SegmentComplete(_, _, _) => (),
                    },
                    FatemapReturn::Full(sender) => match result {
                        ReplicateResult::CompletedTrajectory(trajectory, id) => {
                            replicates_received += 1;
                            println!(
                                "Replicate {} complete with {} samples",
                                id,
                                trajectory.len()
                            );
                            outcomes[id] = Some(Ok(trajectory.clone()));
                            sender.send(FatemapResponse::ReplicateComplete(trajectory, id))
                                .expect("Fatal Error: frontend cannot be found by FatemapEngine. Please ensure the receiver is not dropped prematurely");
                        }
                        ReplicateResult::Failed(error, id) => {
                            replicates_received += 1;
                            println!("Replicate {} failed: {}", id, error);
                            outcomes[id] = Some(Err(error.clone()));
                            sender.send(FatemapResponse::ReplicateFailed(error, id))
                                .expect("Fatal Error: frontend cannot be found by FatemapEngine. Please ensure the receiver is not dropped prematurely");
                        }
                        ReplicateResult::SegmentComplete(trajectory, id, segment) => {
                            sender.send(FatemapResponse::SegmentComplete(trajectory, id, segment))
                                .expect("Fatal Error: frontend cannot be found by FatemapEngine. Please ensure the receiver is not dropped prematurely");
                        }
                    },
                }
            }

            if let Ok(_) = timer_receiver.try_recv() {
                println!("forced termination because max time was reached\n\nWARNING: replicates still running are reported as interrupted");
                break;
            }
        }

        // replicates still outstanding after a forced termination keep a
        // tagged slot instead of vanishing from the ensemble
        let results: Vec<Result<Trajectory, FatemapError>> = outcomes
            .into_iter()
            .map(|slot| slot.unwrap_or(Err(FatemapError::Interrupted)))
            .collect();

        let result = FatemapResponse::EnsembleResult(results);
        match &self.runtime_return {
            FatemapReturn::Minimal(sender) | FatemapReturn::Full(sender) => {
                sender.send(result.clone())
                    .expect("Fatal Error: frontend cannot be found by FatemapEngine. Please ensure the receiver is not dropped prematurely")
            }
        }
        return Ok(result);
    }

    /// Derives an independent per replicate seed by folding the replicate id
    /// into the base seed bytes
    fn replicate_seed(base_seed: [u8; 32], id: ReplicateID) -> [u8; 32] {
        let mut seed = base_seed;
        for (offset, byte) in id.to_le_bytes().iter().enumerate() {
            seed[offset] ^= byte;
        }
        return seed;
    }

    fn engine_runtime_timer(runtime: u64, tx: SyncSender<bool>) {
        let max_runtime = std::time::Duration::from_secs(runtime);
        std::thread::sleep(max_runtime);
        tx.send(true).unwrap();
        return;
    }
}
