#![no_std]
#![deny(missing_docs)]
//! # onewire-core
//! A no-std implementation of the 1-Wire protocol layer.
//!
//! The [OneWire] trait defines the bus primitives a bus master provides: resetting the bus,
//! writing and reading bytes, and writing and reading bits. [OneWireAsync] is the same
//! interface for async environments.
//!
//! On top of the primitives the crate provides the ROM search used to discover devices
//! ([OneWireSearch], [OneWireSearchAsync]), the 1-Wire CRC-8 ([crc8], [verify], [OneWireCrc])
//! and the 64-bit device address ([RomId]).

mod consts;
mod crc;
mod error;
mod rom;
mod search;
mod search_async;
mod traits;
mod traits_async;

pub use consts::*;
pub use crc::{InvalidLength, OneWireCrc, crc8, verify};
pub use error::OneWireError;
pub use rom::RomId;
pub use search::{Discovery, OneWireSearch, OneWireSearchKind};
pub use search_async::OneWireSearchAsync;
pub use traits::{OneWire, OneWireStatus, PresenceResult, Triplet};
pub use traits_async::OneWireAsync;

/// Result type for 1-Wire operations.
pub type OneWireResult<T, E> = Result<T, OneWireError<E>>;
