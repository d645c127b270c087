//! Core model for systems of weighted combinatorial types.
//!
//! A [`System`] is an ordered collection of mutually recursive type
//! definitions, each a non-empty list of constructors carrying an atom
//! weight and, optionally, a frequency mark. This crate owns the symbolic
//! side of the compiler: validation of a freshly constructed system, the
//! derived sets (atomic types, sequence types), the dependency graph with
//! its strongly connected components and the classification of a system as
//! rational, algebraic or unsupported.
//!
//! Numerical treatment (oracles, tuners) and sampler synthesis live in the
//! `boltzgen` crate; this one is purely structural.

pub mod classify;
pub mod graph;
pub mod random;
pub mod system;

pub use classify::{SystemClass, classify};
pub use graph::{DependencyGraph, Vertex};
pub use system::{Arg, Constructor, ParametrisedSystem, System, SystemError};
