//! Core ring logic - pure computation with no direct I/O.
//!
//! Contains the iterative [lookup], the [stabilization] schedule and the [join]
//! procedure, all as state machines advanced by the `actor` module.

pub mod join;
pub mod lookup;
pub mod stabilization;
