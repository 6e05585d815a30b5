//! Chain state — metadata, data table, per-chain latent/partition state
//! and the single-vs-batch codec.

mod model;
pub mod codec;

pub use codec::{ChainBatch, Chains, Shape};
pub use model::{
    ChainState, ColumnMetadata, ColumnPartition, ColumnSpec, DataTable, Hypers, LatentState,
    ModelType, PartitionState, RowMetadata, SuffStats, ViewState,
};
