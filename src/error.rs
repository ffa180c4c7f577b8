//! Error taxonomy shared by the executor and commands.
//!
//! Commands and the executor return `anyhow::Result`; the typed errors here
//! ride inside `anyhow::Error` and are recovered by [`report`] to decide the
//! process exit code and how much detail to print.

use crate::command::ExitCode;
use crate::process::ProcessError;
use std::fmt;
use std::io::Write;
use std::num::NonZeroI32;
use thiserror::Error;

const DEFAULT_EXIT_CODE: NonZeroI32 = NonZeroI32::new(1).unwrap();

/// An explicit stop-everything failure with a user-facing message.
///
/// The exit code is never zero: successful early termination is expressed as
/// [`Outcome::Terminate`](crate::command::Outcome::Terminate), not as an error.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct FatalError {
    pub message: String,
    pub exit_code: NonZeroI32,
}

impl FatalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            exit_code: DEFAULT_EXIT_CODE,
        }
    }

    pub fn with_exit_code(mut self, exit_code: NonZeroI32) -> Self {
        self.exit_code = exit_code;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldFailure {
    pub input: String,
    pub message: String,
}

/// One or more declared input validators rejected the given inputs.
#[derive(Debug, Error)]
pub struct ValidationError {
    pub failures: Vec<FieldFailure>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "Invalid {}: {}", failure.input, failure.message)?;
        }
        Ok(())
    }
}

/// Print `err` to `stderr` and return the exit code the process should use.
///
/// Expected failures (fatal, validation, classified subprocess failures) get
/// their message only. Anything else is treated as a defect and printed with
/// its full cause chain.
pub fn report(err: &anyhow::Error, stderr: &mut dyn Write) -> ExitCode {
    if let Some(fatal) = err.downcast_ref::<FatalError>() {
        let _ = writeln!(stderr, "Error: {}", fatal.message);
        return fatal.exit_code.get();
    }
    if let Some(validation) = err.downcast_ref::<ValidationError>() {
        let _ = writeln!(stderr, "{validation}");
        return 1;
    }
    if let Some(ProcessError::Failed(failure)) = err.downcast_ref::<ProcessError>() {
        let _ = writeln!(stderr, "Error: {failure}");
        return 1;
    }
    let _ = writeln!(stderr, "Unexpected error: {err:?}");
    1
}
