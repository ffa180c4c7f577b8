use crate::executor::CommandContext;
use crate::metadata::{CommandMetadata, OptionValue};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
pub type ExitCode = i32;

/// Parsed option values keyed by canonical option name.
pub type OptionMap = BTreeMap<String, OptionValue>;

/// How a lifecycle stage finished when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Outcome {
    /// Keep going: run the next stage, or exit 0 after `run`.
    #[default]
    Continue,
    /// Stop now and exit with this code, e.g. after listing targets.
    Terminate(ExitCode),
}

impl Outcome {
    pub fn exit_code(self) -> ExitCode {
        match self {
            Outcome::Continue => 0,
            Outcome::Terminate(code) => code,
        }
    }
}

/// Everything a command receives for one invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Invocation {
    /// Canonical command path, root excluded (aliases already resolved).
    pub path: Vec<String>,
    pub inputs: Vec<String>,
    pub options: OptionMap,
    /// Tokens after a literal `--`, passed through verbatim.
    pub passthrough: Vec<String>,
}

impl Invocation {
    /// `true` only when the option is present and set to `true`.
    pub fn flag(&self, name: &str) -> bool {
        self.options
            .get(name)
            .and_then(OptionValue::as_bool)
            .unwrap_or(false)
    }

    pub fn string(&self, name: &str) -> Option<&str> {
        self.options.get(name).and_then(OptionValue::as_str)
    }

    /// All values of a string option, in command-line order.
    pub fn strings(&self, name: &str) -> Vec<&str> {
        match self.options.get(name) {
            Some(OptionValue::String(s)) => vec![s.as_str()],
            Some(OptionValue::List(values)) => values.iter().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }

    pub fn input(&self, index: usize) -> Option<&str> {
        self.inputs.get(index).map(String::as_str)
    }
}

/// A runnable leaf of the command tree.
///
/// The executor calls [`Command::pre_run`] and then, unless it asked to
/// terminate, [`Command::run`]. Both are awaited to completion in order.
#[async_trait]
pub trait Command: Send + Sync {
    fn metadata(&self) -> &CommandMetadata;

    /// Prompt, validate or rewrite the invocation before input validation.
    async fn pre_run(&self, _ctx: &CommandContext<'_>, _inv: &mut Invocation) -> Result<Outcome> {
        Ok(Outcome::Continue)
    }

    async fn run(&self, ctx: &CommandContext<'_>, inv: &Invocation) -> Result<Outcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invocation() -> Invocation {
        let mut options = OptionMap::new();
        options.insert("prod".into(), OptionValue::Bool(true));
        options.insert("port".into(), OptionValue::String("8100".into()));
        options.insert(
            "define".into(),
            OptionValue::List(vec!["a=1".into(), "b=2".into()]),
        );
        Invocation {
            path: vec!["build".into()],
            inputs: vec!["web".into()],
            options,
            passthrough: vec![],
        }
    }

    #[test]
    fn test_invocation_accessors() {
        let inv = invocation();
        assert!(inv.flag("prod"));
        assert!(!inv.flag("port"));
        assert!(!inv.flag("missing"));
        assert_eq!(inv.string("port"), Some("8100"));
        assert_eq!(inv.strings("define"), vec!["a=1", "b=2"]);
        assert_eq!(inv.input(0), Some("web"));
        assert_eq!(inv.input(1), None);
    }

    #[test]
    fn test_outcome_exit_codes() {
        assert_eq!(Outcome::Continue.exit_code(), 0);
        assert_eq!(Outcome::Terminate(0).exit_code(), 0);
        assert_eq!(Outcome::Terminate(4).exit_code(), 4);
    }
}
