//! Commands every stratus tree ships with.

use crate::command::{Command, Invocation, Outcome};
use crate::env_binding::{apply_overrides, option_env_vars};
use crate::executor::CommandContext;
use crate::metadata::{CommandMetadata, Group, InputSpec, OptionValue};
use crate::namespace::{Namespace, NamespaceError, Node};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::io::Write;
use std::sync::Arc;
use tracing::warn;

/// Version of this build, as printed by `version` and `info`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The default command tree: `help`, `version` and `info`.
pub fn root_namespace() -> Result<Namespace, NamespaceError> {
    Namespace::builder("stratus")
        .summary("Run commands from a lazily built command tree")
        .command("help", HelpCommand::new)
        .command("version", VersionCommand::new)
        .command("info", InfoCommand::default)
        .alias("h", "help")
        .build()
}

/// `--version` or `-v` as the only argument means `version`.
pub fn version_shortcut(argv: Vec<String>) -> Vec<String> {
    match argv.as_slice() {
        [flag] if flag == "--version" || flag == "-v" => vec!["version".to_string()],
        _ => argv,
    }
}

/// `help [path...]`: lists a namespace or shows one command's usage.
pub struct HelpCommand {
    metadata: CommandMetadata,
}

impl HelpCommand {
    pub fn new() -> Self {
        Self {
            metadata: CommandMetadata::new("help", "Provides help for a given command")
                .description("Lists the commands of a namespace, or shows the usage of a single command.")
                .input(InputSpec::new("command", "The command path to get help for")),
        }
    }
}

impl Default for HelpCommand {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Command for HelpCommand {
    fn metadata(&self) -> &CommandMetadata {
        &self.metadata
    }

    async fn run(&self, ctx: &CommandContext<'_>, inv: &Invocation) -> Result<Outcome> {
        let root = ctx.root();
        let verbose = inv.flag("verbose");
        let location = root.locate(&inv.inputs).await?;

        // an unknown path lists the deepest namespace reached instead
        if location.command().is_none() && !location.residual.is_empty() {
            warn!(
                "Unable to find command: {} {}",
                root.name(),
                inv.inputs.join(" ")
            );
        }

        let path = location.names();
        let title = std::iter::once(root.name().to_string())
            .chain(path.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ");

        let text = match location.leaf() {
            Node::Namespace(ns) => namespace_help(ns, &title, verbose).await?,
            Node::Command(cmd) => {
                let metadata = apply_overrides(
                    cmd.metadata(),
                    &ctx.config().env_prefix,
                    &path,
                    ctx.env(),
                );
                command_help(&metadata, &title, &path, &ctx.config().env_prefix, verbose)
            }
        };

        ctx.stdout().write_all(text.as_bytes())?;
        Ok(Outcome::Continue)
    }
}

fn visible(groups: &BTreeSet<Group>, verbose: bool) -> bool {
    !groups.contains(&Group::Hidden) && (verbose || !groups.contains(&Group::Advanced))
}

fn tags(groups: &BTreeSet<Group>) -> String {
    groups
        .iter()
        .filter_map(|group| match group {
            Group::Beta => Some(" (beta)"),
            Group::Deprecated => Some(" (deprecated)"),
            Group::Experimental => Some(" (experimental)"),
            Group::Advanced | Group::Hidden => None,
        })
        .collect()
}

/// Two aligned columns, indented.
fn columns(rows: &[(String, String)]) -> String {
    let width = rows.iter().map(|(left, _)| left.len()).max().unwrap_or(0);
    let mut out = String::new();
    for (left, right) in rows {
        let line = format!("    {left:<width$}  {right}");
        let _ = writeln!(out, "{}", line.trim_end());
    }
    out
}

async fn namespace_help(ns: &Arc<Namespace>, title: &str, verbose: bool) -> Result<String> {
    let mut rows = Vec::new();
    for (name, node) in ns.children().await? {
        let (label, groups) = match &node {
            Node::Namespace(_) => (format!("{name} <subcommand>"), BTreeSet::new()),
            Node::Command(cmd) => (name.clone(), cmd.metadata().groups.clone()),
        };
        if !visible(&groups, verbose) {
            continue;
        }
        let mut summary = format!("{}{}", node.summary(), tags(&groups));
        let aliases = ns.aliases_of(&name);
        if !aliases.is_empty() {
            let _ = write!(summary, " (alias: {})", aliases.join(", "));
        }
        rows.push((label, summary));
    }

    let mut text = String::new();
    if !ns.summary().is_empty() {
        writeln!(text, "{title} - {}\n", ns.summary())?;
    }
    writeln!(text, "Usage:\n    {title} <command> [<args>] [--help] [--verbose] [options]\n")?;
    writeln!(text, "Commands:")?;
    text.push_str(&columns(&rows));
    Ok(text)
}

fn command_help(
    metadata: &CommandMetadata,
    title: &str,
    path: &[String],
    env_prefix: &str,
    verbose: bool,
) -> String {
    let mut text = String::new();
    let _ = writeln!(text, "{title} - {}{}\n", metadata.summary, tags(&metadata.groups));
    if let Some(description) = &metadata.description {
        let _ = writeln!(text, "    {description}\n");
    }

    let usage_inputs: String = metadata
        .inputs
        .iter()
        .map(|input| {
            if input.is_required() {
                format!(" <{}>", input.name)
            } else {
                format!(" [<{}>]", input.name)
            }
        })
        .collect();
    let _ = writeln!(text, "Usage:\n    {title}{usage_inputs} [options]");

    if !metadata.inputs.is_empty() {
        let rows: Vec<_> = metadata
            .inputs
            .iter()
            .map(|input| (input.name.clone(), input.summary.clone()))
            .collect();
        let _ = writeln!(text, "\nInputs:");
        text.push_str(&columns(&rows));
    }

    let env_vars = option_env_vars(env_prefix, path, &metadata.options);
    let rows: Vec<_> = metadata
        .options
        .iter()
        .zip(env_vars)
        .filter(|(option, _)| visible(&option.groups, verbose))
        .map(|(option, (_, var))| {
            let mut label = format!("--{}", option.name);
            if !option.is_boolean() {
                let _ = write!(label, "=<{}>", option.name);
            }
            for alias in &option.aliases {
                let _ = write!(label, ", -{alias}");
            }

            let mut summary = format!("{}{}", option.summary, tags(&option.groups));
            match &option.default {
                Some(OptionValue::Bool(false)) | None => {}
                Some(default) => {
                    let _ = write!(summary, " (default: {default})");
                }
            }
            let _ = write!(summary, " [{var}]");
            (label, summary)
        })
        .collect();
    if !rows.is_empty() {
        let _ = writeln!(text, "\nOptions:");
        text.push_str(&columns(&rows));
    }

    text
}

/// `version`: prints [`VERSION`].
pub struct VersionCommand {
    metadata: CommandMetadata,
}

impl VersionCommand {
    pub fn new() -> Self {
        Self {
            metadata: CommandMetadata::new("version", "Print the stratus version")
                .group(Group::Hidden),
        }
    }
}

impl Default for VersionCommand {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Command for VersionCommand {
    fn metadata(&self) -> &CommandMetadata {
        &self.metadata
    }

    async fn run(&self, ctx: &CommandContext<'_>, _inv: &Invocation) -> Result<Outcome> {
        writeln!(ctx.stdout(), "{VERSION}")?;
        Ok(Outcome::Continue)
    }
}

/// A program whose version `info` reports.
#[derive(Debug, Clone)]
pub struct Tool {
    pub name: String,
    pub args: Vec<String>,
}

impl Tool {
    pub fn new(name: impl Into<String>, args: &[&str]) -> Self {
        Self {
            name: name.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// Prints the versions of the tools stratus commonly shells out to.
pub struct InfoCommand {
    metadata: CommandMetadata,
    tools: Vec<Tool>,
}

impl InfoCommand {
    pub fn new(tools: Vec<Tool>) -> Self {
        Self {
            metadata: CommandMetadata::new("info", "Print system and environment information"),
            tools,
        }
    }
}

impl Default for InfoCommand {
    fn default() -> Self {
        Self::new(vec![
            Tool::new("git", &["--version"]),
            Tool::new("node", &["--version"]),
            Tool::new("npm", &["--version"]),
        ])
    }
}

#[async_trait]
impl Command for InfoCommand {
    fn metadata(&self) -> &CommandMetadata {
        &self.metadata
    }

    async fn run(&self, ctx: &CommandContext<'_>, _inv: &Invocation) -> Result<Outcome> {
        let mut rows = vec![("stratus".to_string(), VERSION.to_string())];
        for tool in &self.tools {
            let version = match ctx.subprocess(&tool.name, &tool.args).output().await {
                Ok(output) => output.trim().to_string(),
                Err(err) if err.is_command_not_found() => "not installed".to_string(),
                Err(err) => match err.as_failure() {
                    Some(failure) => {
                        warn!(tool = %tool.name, %failure, "version check failed");
                        "error".to_string()
                    }
                    None => return Err(err.into()),
                },
            };
            rows.push((tool.name.clone(), version));
        }

        ctx.stdout().write_all(columns(&rows).as_bytes())?;
        Ok(Outcome::Continue)
    }
}
