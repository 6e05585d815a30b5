//! ChainStateCodec — single chain vs batch of chains
//!
//! Callers hand over either one `(X_L, X_D)` pair or two equal-length lists.
//! `normalize` turns that into a `ChainBatch` plus the `Shape` it came in,
//! `denormalize` inverts it exactly.

use super::model::{ChainState, LatentState, PartitionState};
use crate::error::{ChainpoolError, Result};
use serde::{Deserialize, Serialize};

/// Either one value or an ordered list of values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Chains<T> {
    Single(T),
    Many(Vec<T>),
}

impl<T> Chains<T> {
    pub fn len(&self) -> usize {
        match self {
            Chains::Single(_) => 1,
            Chains::Many(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn shape(&self) -> Shape {
        match self {
            Chains::Single(_) => Shape::Scalar,
            Chains::Many(_) => Shape::Batch,
        }
    }

    pub fn single(&self) -> Option<&T> {
        match self {
            Chains::Single(t) => Some(t),
            Chains::Many(_) => None,
        }
    }

    pub fn into_single(self) -> Option<T> {
        match self {
            Chains::Single(t) => Some(t),
            Chains::Many(_) => None,
        }
    }

    pub fn many(&self) -> Option<&[T]> {
        match self {
            Chains::Single(_) => None,
            Chains::Many(v) => Some(v),
        }
    }

    /// Flatten to a list regardless of shape
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Chains::Single(t) => vec![t],
            Chains::Many(v) => v,
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        match self {
            Chains::Single(t) => std::slice::from_ref(t).iter(),
            Chains::Many(v) => v.iter(),
        }
    }
}

macro_rules! chains_from {
    ($($ty:ty),*) => {$(
        impl From<$ty> for Chains<$ty> {
            fn from(value: $ty) -> Self {
                Chains::Single(value)
            }
        }

        impl From<Vec<$ty>> for Chains<$ty> {
            fn from(values: Vec<$ty>) -> Self {
                Chains::Many(values)
            }
        }
    )*};
}

chains_from!(LatentState, PartitionState, ChainState);

/// Whether the caller passed one chain or a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Shape {
    Scalar,
    Batch,
}

/// Ordered chains of one orchestration call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainBatch {
    chains: Vec<ChainState>,
}

impl ChainBatch {
    pub fn new(chains: Vec<ChainState>) -> Self {
        Self { chains }
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChainState> {
        self.chains.iter()
    }

    pub fn into_inner(self) -> Vec<ChainState> {
        self.chains
    }
}

impl From<Vec<ChainState>> for ChainBatch {
    fn from(chains: Vec<ChainState>) -> Self {
        Self::new(chains)
    }
}

impl IntoIterator for ChainBatch {
    type Item = ChainState;
    type IntoIter = std::vec::IntoIter<ChainState>;

    fn into_iter(self) -> Self::IntoIter {
        self.chains.into_iter()
    }
}

/// Pair up latent and partition states into a batch, remembering the shape
pub fn normalize(
    latent: Chains<LatentState>,
    partition: Chains<PartitionState>,
) -> Result<(ChainBatch, Shape)> {
    match (latent, partition) {
        (Chains::Single(l), Chains::Single(p)) => {
            Ok((ChainBatch::new(vec![ChainState::new(l, p)]), Shape::Scalar))
        }
        (Chains::Many(ls), Chains::Many(ps)) => {
            if ls.len() != ps.len() {
                return Err(ChainpoolError::input_shape(format!(
                    "{} latent states but {} partition states",
                    ls.len(),
                    ps.len()
                )));
            }
            let chains = ls
                .into_iter()
                .zip(ps)
                .map(|(l, p)| ChainState::new(l, p))
                .collect();
            Ok((ChainBatch::new(chains), Shape::Batch))
        }
        (Chains::Single(_), Chains::Many(ps)) => Err(ChainpoolError::input_shape(format!(
            "a single latent state was paired with a list of {} partition states",
            ps.len()
        ))),
        (Chains::Many(ls), Chains::Single(_)) => Err(ChainpoolError::input_shape(format!(
            "a list of {} latent states was paired with a single partition state",
            ls.len()
        ))),
    }
}

/// Inverse of [`normalize`]
pub fn denormalize(
    batch: ChainBatch,
    shape: Shape,
) -> Result<(Chains<LatentState>, Chains<PartitionState>)> {
    match shape {
        Shape::Scalar => {
            if batch.len() != 1 {
                return Err(ChainpoolError::input_shape(format!(
                    "scalar shape needs exactly one chain, got {}",
                    batch.len()
                )));
            }
            let mut chains = batch.into_inner();
            let (l, p) = chains.remove(0).into_parts();
            Ok((Chains::Single(l), Chains::Single(p)))
        }
        Shape::Batch => {
            let (ls, ps): (Vec<_>, Vec<_>) = batch.into_iter().map(ChainState::into_parts).unzip();
            Ok((Chains::Many(ls), Chains::Many(ps)))
        }
    }
}
