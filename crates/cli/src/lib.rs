//! Terminal front-end for the Joy IP job controller.

pub mod commands;
pub mod config;
pub mod edits;
pub mod render;
pub mod repl;
