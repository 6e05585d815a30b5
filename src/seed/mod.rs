//! Seed management — one deterministic seed per chain task
//!
//! Every chain dispatched by the engine consumes exactly one seed from a
//! single sequencer, so a whole run is reproducible from its base seed.

mod sequencer;

pub use sequencer::{Seed, SeedSequencer};
