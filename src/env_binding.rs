//! Per-option environment variable overrides.
//!
//! Every option of every command can be defaulted from the environment:
//! `stratus cordova run --livereload-port` reads
//! `STRATUS_CMDOPTS_CORDOVA_RUN_LIVERELOAD_PORT`. The override replaces the
//! option's declared default before parsing, so an explicit flag still wins.

use crate::env::Environment;
use crate::metadata::{CommandMetadata, OptionSpec, OptionValue};
use tracing::debug;

/// Prefix of every override variable.
pub const DEFAULT_ENV_PREFIX: &str = "STRATUS_CMDOPTS";

/// `PREFIX_<PATH>_<OPTION>`, uppercased. Only the option name has its `-`
/// turned into `_`; path segments are kept as they are.
///
/// `path` is the canonical command path without the program's root name.
pub fn derive_env_var_name<S: AsRef<str>>(prefix: &str, path: &[S], option: &str) -> String {
    let option = option.replace('-', "_");
    std::iter::once(prefix)
        .chain(path.iter().map(AsRef::as_ref))
        .chain(std::iter::once(option.as_str()))
        .map(|segment| segment.to_uppercase())
        .collect::<Vec<_>>()
        .join("_")
}

/// `(option name, variable name)` for each option, in declaration order.
pub fn option_env_vars<S: AsRef<str>>(
    prefix: &str,
    path: &[S],
    options: &[OptionSpec],
) -> Vec<(String, String)> {
    options
        .iter()
        .map(|o| (o.name.clone(), derive_env_var_name(prefix, path, &o.name)))
        .collect()
}

/// Coerce a raw environment value for `option`: boolean options are `true`
/// unless the value is empty or `"0"`, string options take it verbatim.
pub fn coerce(option: &OptionSpec, raw: &str) -> OptionValue {
    if option.is_boolean() {
        OptionValue::Bool(!raw.is_empty() && raw != "0")
    } else {
        OptionValue::String(raw.to_string())
    }
}

/// A copy of `metadata` whose option defaults reflect any overrides set in
/// `env`.
pub fn apply_overrides<S: AsRef<str>>(
    metadata: &CommandMetadata,
    prefix: &str,
    path: &[S],
    env: &Environment,
) -> CommandMetadata {
    let mut metadata = metadata.clone();
    for option in &mut metadata.options {
        let var = derive_env_var_name(prefix, path, &option.name);
        if let Some(raw) = env.get_var(&var) {
            debug!(option = %option.name, %var, "option default overridden from environment");
            option.default = Some(coerce(option, raw));
        }
    }
    metadata
}
