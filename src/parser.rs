//! Turning the residual argv of a located command into inputs and options.
//!
//! Grammar, per token:
//! - `--` ends option parsing; everything after it is passed through verbatim.
//! - `--name`, `--name=value`, `--name value` for declared options; boolean
//!   options never consume the next token and accept `--no-name`.
//! - `-x`, `-x value`, `-x=value` for single-character aliases; `-abc` sets
//!   several boolean aliases at once, and `-p8100` gives a string alias its
//!   value inline.
//! - anything else (including negative numbers) is a positional input.
//!
//! Unknown flags are kept as options rather than rejected: `--foo=bar` is a
//! string, a bare `--foo` is `true`.

use crate::command::OptionMap;
use crate::metadata::{CommandMetadata, Group, MetadataError, OptionSpec, OptionValue};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedArgs {
    pub inputs: Vec<String>,
    pub options: OptionMap,
    pub passthrough: Vec<String>,
}

/// Options every command accepts in addition to its own.
pub fn global_options(interactive: bool) -> Vec<OptionSpec> {
    vec![
        OptionSpec::boolean("help", "Display help for commands").group(Group::Hidden),
        OptionSpec::boolean("verbose", "Print debug log messages").group(Group::Hidden),
        OptionSpec::boolean("quiet", "Do not print log messages").group(Group::Hidden),
        OptionSpec::boolean("interactive", "Disable prompts with --no-interactive")
            .default_bool(interactive)
            .group(Group::Hidden),
        OptionSpec::boolean("confirm", "Automatically answer yes to confirmation prompts")
            .group(Group::Advanced),
        OptionSpec::boolean("json", "Use JSON output where supported").group(Group::Hidden),
    ]
}

/// Fails when one of the command's options is named like a global option.
pub fn check_global_collisions(
    metadata: &CommandMetadata,
    globals: &[OptionSpec],
) -> Result<(), MetadataError> {
    match globals
        .iter()
        .find(|global| metadata.find_option(&global.name).is_some())
    {
        Some(global) => Err(MetadataError::GlobalOptionCollision {
            command: metadata.name.clone(),
            option: global.name.clone(),
        }),
        None => Ok(()),
    }
}

/// The command's own options followed by `globals`.
///
/// A command option named like a global one is a declaration defect.
pub fn merge_global_options(
    metadata: &CommandMetadata,
    globals: Vec<OptionSpec>,
) -> Result<Vec<OptionSpec>, MetadataError> {
    check_global_collisions(metadata, &globals)?;
    let mut merged = metadata.options.clone();
    merged.extend(globals);
    Ok(merged)
}

struct ArgParser<'a> {
    specs: &'a [OptionSpec],
    argv: &'a [String],
    pos: usize,
    parsed: ParsedArgs,
}

impl<'a> ArgParser<'a> {
    fn new(specs: &'a [OptionSpec], argv: &'a [String]) -> Self {
        Self {
            specs,
            argv,
            pos: 0,
            parsed: ParsedArgs::default(),
        }
    }

    fn parse(mut self) -> ParsedArgs {
        while let Some(token) = self.consume() {
            if token == "--" {
                self.parsed.passthrough = self.argv[self.pos..].to_vec();
                break;
            }
            if let Some(body) = token.strip_prefix("--").filter(|b| !b.is_empty()) {
                self.parse_long(body);
            } else if is_short_flag(token) {
                self.parse_short(&token[1..]);
            } else {
                self.parsed.inputs.push(token.to_string());
            }
        }
        self.fill_defaults();
        self.parsed
    }

    fn consume(&mut self) -> Option<&'a str> {
        let token = self.argv.get(self.pos)?;
        self.pos += 1;
        Some(token)
    }

    /// The next token, if it can serve as an option value.
    fn take_value(&mut self) -> Option<String> {
        let next = self.argv.get(self.pos)?;
        if next == "--" || (next.starts_with('-') && next.len() > 1 && !is_number(next)) {
            return None;
        }
        self.pos += 1;
        Some(next.clone())
    }

    fn find_long(&self, name: &str) -> Option<&'a OptionSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    fn find_short(&self, alias: char) -> Option<&'a OptionSpec> {
        self.specs.iter().find(|s| s.aliases.contains(&alias))
    }

    fn parse_long(&mut self, body: &str) {
        let (name, inline) = match body.split_once('=') {
            Some((name, value)) => (name, Some(value)),
            None => (body, None),
        };

        if let Some(spec) = self.find_long(name) {
            self.assign(spec, inline);
            return;
        }
        if let Some(spec) = name
            .strip_prefix("no-")
            .and_then(|n| self.find_long(n))
            .filter(|s| s.is_boolean())
        {
            self.parsed
                .options
                .insert(spec.name.clone(), OptionValue::Bool(false));
            return;
        }

        let value = match inline {
            Some(v) => OptionValue::String(v.to_string()),
            None => OptionValue::Bool(true),
        };
        self.parsed.options.insert(name.to_string(), value);
    }

    fn parse_short(&mut self, body: &str) {
        let (flags, inline) = match body.split_once('=') {
            Some((flags, value)) => (flags, Some(value)),
            None => (body, None),
        };

        let chars: Vec<(usize, char)> = flags.char_indices().collect();
        for (i, &(offset, alias)) in chars.iter().enumerate() {
            let last = i + 1 == chars.len();
            let Some(spec) = self.find_short(alias) else {
                let value = match (last, inline) {
                    (true, Some(v)) => OptionValue::String(v.to_string()),
                    _ => OptionValue::Bool(true),
                };
                self.parsed.options.insert(alias.to_string(), value);
                continue;
            };

            if last {
                self.assign(spec, inline);
            } else if spec.is_boolean() {
                self.parsed
                    .options
                    .insert(spec.name.clone(), OptionValue::Bool(true));
            } else {
                // -p8100: the rest of the cluster is the value
                let rest = &flags[offset + alias.len_utf8()..];
                self.push_string(spec, rest.to_string());
                return;
            }
        }
    }

    fn assign(&mut self, spec: &OptionSpec, inline: Option<&str>) {
        if spec.is_boolean() {
            let value = inline.is_none_or(|v| !matches!(v, "" | "0" | "false"));
            self.parsed
                .options
                .insert(spec.name.clone(), OptionValue::Bool(value));
            return;
        }
        let value = match inline {
            Some(v) => v.to_string(),
            None => self.take_value().unwrap_or_default(),
        };
        self.push_string(spec, value);
    }

    fn push_string(&mut self, spec: &OptionSpec, value: String) {
        let merged = match self.parsed.options.remove(&spec.name) {
            Some(OptionValue::String(prev)) => OptionValue::List(vec![prev, value]),
            Some(OptionValue::List(mut values)) => {
                values.push(value);
                OptionValue::List(values)
            }
            _ => OptionValue::String(value),
        };
        self.parsed.options.insert(spec.name.clone(), merged);
    }

    fn fill_defaults(&mut self) {
        for spec in self.specs {
            if self.parsed.options.contains_key(&spec.name) {
                continue;
            }
            let value = match (&spec.default, spec.is_boolean()) {
                (Some(default), _) => default.clone(),
                (None, true) => OptionValue::Bool(false),
                (None, false) => continue,
            };
            self.parsed.options.insert(spec.name.clone(), value);
        }
    }
}

fn is_number(token: &str) -> bool {
    token.parse::<f64>().is_ok()
}

fn is_short_flag(token: &str) -> bool {
    token.len() > 1 && token.starts_with('-') && !token.starts_with("--") && !is_number(token)
}

/// Parse `argv` against `specs`.
///
/// Declared options missing from `argv` take their default; booleans
/// without a default are `false`, string options without one are absent.
pub fn parse_args(specs: &[OptionSpec], argv: &[String]) -> ParsedArgs {
    ArgParser::new(specs, argv).parse()
}
