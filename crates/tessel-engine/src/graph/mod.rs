//! Declarative graph building and the sequential interpreter.
//!
//! A [`GraphBuilder`] declares the node set, static edge list, and state
//! shape for one task type; [`compile`] validates the declaration and
//! produces an immutable [`CompiledGraph`] that many concurrent runs share.

mod builder;
mod compiled;
mod edge;

pub use builder::{compile, GraphBuilder, GraphNode};
pub use compiled::{CompiledGraph, StepEvent};
pub use edge::{hub_edges, Edge};
