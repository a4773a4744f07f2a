//! Modem adapters: token tables, URC parsers and the vendor commands
//! built on the engine.

#[cfg(feature = "bg96")]
pub mod bg96;
