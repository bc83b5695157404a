pub mod engine;
pub mod prober;
pub mod result;

pub use engine::ResolutionEngine;
pub use prober::{ProbeOp, ProbeOutcome, Prober};
pub use result::{
    AttemptOutcome, Resolution, ResolutionAttempt, ResolveError, SelectorResolutionFailed,
};
