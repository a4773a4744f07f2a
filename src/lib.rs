#![cfg_attr(not(test), no_std)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod asynch;
pub mod at;
pub mod comm;
pub mod config;
pub mod error;
pub mod hex;
pub mod modules;
pub mod pdn;
pub(crate) mod pktio;
pub mod registration;
pub mod response;
pub mod socket;
pub mod token_table;
pub mod types;
pub mod urc;

#[cfg(test)]
mod test_helpers;

pub use asynch::{control::Control, new, resources::Resources, runner::Runner};
pub use comm::{CommInterface, IoComm};
pub use config::CellularConfig;
pub use error::{AtError, CommError, Error};
pub use token_table::{TokenTable, UrcHandlerEntry};
