//! CLI module for the closetkit library
//!
//! This module is only available when the "cli" feature is enabled.

#[path = "main.rs"]
mod main_impl;

pub use main_impl::{
    main, Cli, Commands, EngineArg, GarmentsCommand, ModelsCommand, OutfitsCommand, ScanArgs,
};
