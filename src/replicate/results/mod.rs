use crate::FatemapError;
use super::lineage::trajectory::Trajectory;

type ID = usize;
type SegmentIndex = usize;

/// The different types of data which may be sent back from a replicate
#[derive(Clone, Debug, PartialEq)]
pub enum ReplicateResult {
    /// One passage segment finished and was stitched onto the running
    /// trajectory; only sent when full return granularity is selected
    SegmentComplete(Trajectory, ID, SegmentIndex),
    /// The whole passage plan completed and this is the concatenated
    /// trajectory
    CompletedTrajectory(Trajectory, ID),
    /// The replicate stopped early; sibling replicates are unaffected
    Failed(FatemapError, ID),
}
