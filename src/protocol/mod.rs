//! NNTP protocol: response constants, command parsing, wire codec

pub mod command;
pub mod responses;
pub mod wire;

pub use command::{CommandLine, Verb};
