//! Presentation layer with view bindings and command-line reporting.

/// View to image load bindings.
pub mod binding;
/// Command execution.
pub mod commands;

pub use binding::ImageBindings;
pub use commands::run_command;
