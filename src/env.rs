use std::collections::HashMap;
use std::env as stdenv;
use std::path::{Path, PathBuf};

/// Snapshot of the process environment owned by one [`Executor`](crate::Executor).
///
/// The environment contains:
/// - `vars`: environment variables used for option overrides and handed to
///   spawned subprocesses.
/// - `current_dir`: the working directory commands and subprocesses run in.
///
/// Unlike reading `std::env` directly, two executors holding different
/// snapshots never observe each other's variables.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Key-value store of environment variables (e.g., PATH, HOME).
    pub vars: HashMap<String, String>,
    /// The current working directory for command execution.
    pub current_dir: PathBuf,
}

impl Environment {
    /// Capture the current process state into a new `Environment` instance.
    pub fn new() -> Self {
        let vars = stdenv::vars().collect();
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self { vars, current_dir }
    }

    /// An environment with no variables, rooted at `current_dir`.
    pub fn empty(current_dir: impl Into<PathBuf>) -> Self {
        Self {
            vars: HashMap::new(),
            current_dir: current_dir.into(),
        }
    }

    pub fn get_var(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Set or override an environment variable in `self.vars`.
    pub fn set_var(&mut self, key: impl Into<String>, val: impl Into<String>) {
        self.vars.insert(key.into(), val.into());
    }

    /// Builder-style variant of [`Environment::set_var`].
    pub fn with_var(mut self, key: impl Into<String>, val: impl Into<String>) -> Self {
        self.set_var(key, val);
        self
    }

    pub fn current_dir(&self) -> &Path {
        &self.current_dir
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}
