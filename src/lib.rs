#![doc = include_str!("../README.md")]
//! ## Feature flags
#![doc = document_features::document_features!()]
//!

// Public modules
mod common;
mod error;

pub mod actor;
#[cfg(feature = "async")]
pub mod async_chord;
mod chord;
pub mod core;
pub mod testnet;

pub use crate::common::{
    bit_length, messages, Failure, HintCache, Id, LocalHop, Node, Ring, RingPosition, RoutingTable,
    Side, Status, Wedge, DEFAULT_HINT_CAPACITY, ID_SIZE, NBIT,
};
pub use chord::{Chord, ChordBuilder, ChordWasShutdown, LookupError};
pub use error::{Error, Result};

pub mod errors {
    //! Exported errors
    pub use super::chord::{ChordWasShutdown, LookupError};
    pub use super::core::join::JoinError;
    pub use super::error::Error;
}
