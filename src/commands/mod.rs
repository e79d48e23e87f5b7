//! Command implementations for the OptiPack CLI.

pub mod optimize_command;
