//! vdut-cli: Command-line interface for vdut
//!
//! Provides the `vdut` binary: a full orchestrated test run plus standalone
//! device and agent commands.

pub mod commands;
pub mod output;
pub mod signal;
