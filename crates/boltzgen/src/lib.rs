//! Compilation of weighted combinatorial systems into Boltzmann rejection
//! samplers.
//!
//! The pipeline mirrors the data flow of the compiler: a parsed
//! specification becomes a validated [`boltzgen_core::System`], the
//! classification picks the sampler specialisation, an oracle (the internal
//! bisection one in [`oracle`] or the external convex-program bridge in
//! [`tuner`]) produces a [`boltzgen_core::ParametrisedSystem`], the
//! [`plan`] module turns it into an abstract sampler plan, and [`emit`]
//! renders the plan as self-contained Rust source.

pub mod emit;
pub mod errors;
pub mod input;
pub mod oracle;
pub mod plan;
pub mod tuner;

pub use errors::BoltzgenError;

/// Re-exports of the types a driver of the pipeline needs.
pub mod prelude {
    pub use crate::emit::{EmitterFlags, emit};
    pub use crate::errors::BoltzgenError;
    pub use crate::input::{parse_system, system_from_spec};
    pub use crate::oracle::Oracle;
    pub use crate::plan::{SamplerPlan, plan};
    pub use crate::tuner::TunerConfig;
    pub use boltzgen_core::{ParametrisedSystem, System, SystemClass, classify};
}
