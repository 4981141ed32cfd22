//! CLI subcommands.

pub mod group;
pub mod identity;
pub mod job;
pub mod token;
