//! Turning argv into one awaited command lifecycle.

use crate::command::{Command, ExitCode, Invocation, Outcome};
use crate::config::Config;
use crate::env::Environment;
use crate::env_binding::apply_overrides;
use crate::error::FatalError;
use crate::io_adapters::SharedWriter;
use crate::metadata::{CommandMetadata, CommandScope};
use crate::namespace::{Namespace, ResolvedLocation};
use crate::parser::{global_options, merge_global_options, parse_args};
use crate::process::{Subprocess, SubprocessOptions};
use crate::project::{MarkerFileDetector, ProjectDetector};
use crate::prompt::{NoPrompter, Prompter};
use crate::validators::validate_inputs;
use anyhow::{Result, bail};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Owns a command tree and runs invocations against it.
///
/// The tree, and every node materialized in it, lives as long as the
/// executor; nested [`Executor::run_command`] calls share it.
pub struct Executor {
    root: Arc<Namespace>,
    env: Environment,
    config: Config,
    project: Arc<dyn ProjectDetector>,
    prompter: Arc<dyn Prompter>,
    out: SharedWriter,
}

impl Executor {
    /// An executor configured from `env`, writing to stdout and never
    /// prompting.
    pub fn new(root: Namespace, env: Environment) -> Self {
        let config = Config::from_env(&env);
        Self {
            root: Arc::new(root),
            project: Arc::new(MarkerFileDetector::new(&config.project_marker)),
            prompter: Arc::new(NoPrompter),
            out: SharedWriter::stdout(),
            env,
            config,
        }
    }

    /// Replace the configuration. The project detector is rebuilt from the
    /// new `project_marker`, so set a custom detector after this call.
    pub fn with_config(mut self, config: Config) -> Self {
        self.project = Arc::new(MarkerFileDetector::new(&config.project_marker));
        self.config = config;
        self
    }

    /// Decide project membership with `detector` instead of the marker file.
    pub fn with_project_detector(mut self, detector: impl ProjectDetector + 'static) -> Self {
        self.project = Arc::new(detector);
        self
    }

    /// Ask for missing required inputs through `prompter`.
    pub fn with_prompter(mut self, prompter: impl Prompter + 'static) -> Self {
        self.prompter = Arc::new(prompter);
        self
    }

    /// Send command output to `out` instead of stdout.
    pub fn with_output(mut self, out: SharedWriter) -> Self {
        self.out = out;
        self
    }

    pub fn root(&self) -> &Arc<Namespace> {
        &self.root
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run `argv` to completion and return the process exit code.
    pub async fn execute(&self, argv: &[String]) -> Result<ExitCode> {
        let outcome = self.run_command(argv.to_vec()).await?;
        Ok(outcome.exit_code())
    }

    /// Resolve and run `argv`. Commands use this (through
    /// [`CommandContext::run_command`]) to invoke other commands.
    pub fn run_command(&self, argv: Vec<String>) -> BoxFuture<'_, Result<Outcome>> {
        async move { self.dispatch(argv).await }.boxed()
    }

    async fn dispatch(&self, argv: Vec<String>) -> Result<Outcome> {
        let location = self.resolve(&argv).await?;
        let Some(command) = location.command().cloned() else {
            bail!("no command matched {argv:?}");
        };
        let path = location.names();

        let metadata = apply_overrides(
            command.metadata(),
            &self.config.env_prefix,
            &path,
            &self.env,
        );
        let specs = merge_global_options(&metadata, global_options(self.config.interactive))?;
        let parsed = parse_args(&specs, &location.residual);
        let mut inv = Invocation {
            path,
            inputs: parsed.inputs,
            options: parsed.options,
            passthrough: parsed.passthrough,
        };

        if inv.flag("help") && inv.path != ["help"] {
            let mut help = vec!["help".to_string()];
            help.extend(inv.path.iter().cloned());
            return self.run_command(help).await;
        }

        if metadata.scope == CommandScope::Project && self.project_root().is_none() {
            return Err(FatalError::new(format!(
                "Sorry! `{} {}` can only be run in a project directory.",
                self.root.name(),
                inv.path.join(" ")
            ))
            .into());
        }

        debug!(path = ?inv.path, inputs = ?inv.inputs, "running command");
        let ctx = CommandContext { executor: self };

        let outcome = command.pre_run(&ctx, &mut inv).await?;
        if let Outcome::Terminate(code) = outcome {
            debug!(path = ?inv.path, code, "terminated in pre_run");
            return Ok(outcome);
        }

        if inv.flag("interactive") {
            self.prompt_missing_inputs(&metadata, &mut inv).await?;
        }
        validate_inputs(&metadata.inputs, &inv.inputs)?;

        command.run(&ctx, &inv).await
    }

    /// Locate `argv`, falling back once to `help <argv...>` when it does not
    /// reach a command.
    async fn resolve(&self, argv: &[String]) -> Result<ResolvedLocation> {
        let location = self.root.locate(argv).await?;
        if location.command().is_some() {
            return Ok(location);
        }

        debug!(?argv, "no command matched, falling back to help");
        let mut help = vec!["help".to_string()];
        help.extend_from_slice(argv);
        let location = self.root.locate(&help).await?;
        if location.command().is_none() {
            bail!("no command matched {argv:?} and no `help` command is registered");
        }
        Ok(location)
    }

    /// Ask for required inputs that were not given, in declaration order.
    ///
    /// Stops at the first input that cannot be filled; validation then
    /// reports whatever is still missing.
    async fn prompt_missing_inputs(
        &self,
        metadata: &CommandMetadata,
        inv: &mut Invocation,
    ) -> Result<()> {
        for (i, spec) in metadata.inputs.iter().enumerate() {
            let given = inv.inputs.get(i).is_some_and(|v| !v.trim().is_empty());
            if given || !spec.is_required() {
                continue;
            }
            if i > inv.inputs.len() {
                break;
            }
            let label = if spec.summary.is_empty() {
                &spec.name
            } else {
                &spec.summary
            };
            let Some(answer) = self.prompter.prompt(&format!("{label}: ")).await? else {
                break;
            };
            match inv.inputs.get_mut(i) {
                Some(slot) => *slot = answer,
                None => inv.inputs.push(answer),
            }
        }
        Ok(())
    }

    fn project_root(&self) -> Option<PathBuf> {
        self.project.detect(self.env.current_dir())
    }
}

/// What a running command can reach of the executor that invoked it.
pub struct CommandContext<'a> {
    executor: &'a Executor,
}

impl<'a> CommandContext<'a> {
    /// Run another command through the same executor and tree.
    pub fn run_command(&self, argv: Vec<String>) -> BoxFuture<'a, Result<Outcome>> {
        self.executor.run_command(argv)
    }

    /// A subprocess running in the executor's working directory with its
    /// environment.
    pub fn subprocess<I, S>(&self, name: impl Into<String>, args: I) -> Subprocess
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let env = &self.executor.env;
        Subprocess::new(
            name,
            args,
            SubprocessOptions {
                cwd: Some(env.current_dir().to_path_buf()),
                env: Some(env.vars.clone()),
            },
        )
    }

    pub fn env(&self) -> &'a Environment {
        &self.executor.env
    }

    pub fn config(&self) -> &'a Config {
        &self.executor.config
    }

    pub fn root(&self) -> &'a Arc<Namespace> {
        &self.executor.root
    }

    pub fn project_root(&self) -> Option<PathBuf> {
        self.executor.project_root()
    }

    pub async fn prompt(&self, message: &str) -> Result<Option<String>> {
        self.executor.prompter.prompt(message).await
    }

    /// Sink for user-facing output.
    pub fn stdout(&self) -> SharedWriter {
        self.executor.out.clone()
    }
}
