// src/work/mod.rs

//! Units of work and the data they exchange.
//!
//! - [`data`] holds the [`Data`] payload type.
//! - [`unit`] defines [`WorkUnit`], its [`Outcome`] and the [`WorkContext`]
//!   it runs with.
//! - [`command`] builds work units that run shell commands.

pub mod command;
pub mod data;
pub mod unit;

pub use command::command_unit;
pub use data::Data;
pub use unit::{Outcome, WorkContext, WorkUnit};
