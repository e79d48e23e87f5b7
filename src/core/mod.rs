//! Core processing engine: orchestration, containers, codecs, events.

pub mod bus;
pub mod codecs;
pub mod collector;
pub mod containers;
pub mod events;
pub mod executor;
pub mod formats;
pub mod fs_util;
pub mod mime;
pub mod parallel;
pub mod registry;
pub mod scanner;
