//! ResultAssembler — turn ordered worker results back into the caller's shape

use crate::error::Result;
use crate::state::codec::denormalize;
use crate::state::{ChainBatch, ChainState, Chains, LatentState, PartitionState, Shape};

/// Split results into latent and partition sequences, or single values when
/// the call was scalar. Order is kept as given.
pub fn assemble(
    results: Vec<ChainState>,
    shape: Shape,
) -> Result<(Chains<LatentState>, Chains<PartitionState>)> {
    denormalize(ChainBatch::new(results), shape)
}
