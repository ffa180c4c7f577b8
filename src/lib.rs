//! A command namespace and execution engine for multi-level CLIs.
//!
//! Commands live in a tree of [`Namespace`]s whose children are built lazily
//! and cached on first use. An [`Executor`] walks argv down the tree, binds
//! per-option environment overrides, parses the remaining tokens and runs the
//! command's lifecycle. Commands shell out through [`process::Subprocess`],
//! which classifies failures and captures output.

pub mod builtin;
pub mod command;
pub mod config;
pub mod env;
pub mod env_binding;
pub mod error;
pub mod executor;
pub mod io_adapters;
pub mod logging;
pub mod metadata;
pub mod namespace;
pub mod parser;
pub mod process;
pub mod project;
pub mod prompt;
pub mod validators;

pub use command::{Command, ExitCode, Invocation, Outcome};
pub use config::Config;
pub use env::Environment;
pub use error::{FatalError, ValidationError};
pub use executor::{CommandContext, Executor};
pub use metadata::{CommandMetadata, InputSpec, OptionSpec};
pub use namespace::Namespace;
