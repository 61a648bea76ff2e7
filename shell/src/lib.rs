//! `shellax`: a small Unix shell.
//!
//! A line goes through [`parser::parse`] into a linked chain of
//! [`types::Command`] stages, and [`eval::eval`] runs the chain as one
//! forked process per stage, wired together with pipes and redirects.

pub mod builtin;
pub mod eval;
pub mod global;
pub mod job;
pub mod parser;
pub mod prompt;
pub mod search;
pub mod types;
