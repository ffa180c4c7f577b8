use crate::env::Environment;
use crate::env_binding::DEFAULT_ENV_PREFIX;

/// File marking a project root unless configured otherwise.
pub const DEFAULT_PROJECT_MARKER: &str = "stratus.toml";

/// Runtime settings read once from the environment at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Prefix of per-option override variables.
    pub env_prefix: String,
    /// Raw `STRATUS_LOG` directive, if any.
    pub log_filter: Option<String>,
    /// Default of the global `--interactive` flag.
    pub interactive: bool,
    pub color: bool,
    /// File whose presence marks a project directory.
    pub project_marker: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
            log_filter: None,
            interactive: true,
            color: true,
            project_marker: DEFAULT_PROJECT_MARKER.to_string(),
        }
    }
}

impl Config {
    pub fn from_env(env: &Environment) -> Self {
        let ci = env.get_var("CI").is_some();
        let interactive_off = env
            .get_var("STRATUS_INTERACTIVE")
            .is_some_and(|v| v.is_empty() || v == "0");

        Self {
            log_filter: env
                .get_var("STRATUS_LOG")
                .filter(|v| !v.is_empty())
                .map(str::to_string),
            interactive: !(ci || interactive_off),
            color: env.get_var("NO_COLOR").is_none(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_env() {
        let config = Config::from_env(&Environment::empty("/"));
        assert_eq!(config, Config::default());
        assert_eq!(config.env_prefix, "STRATUS_CMDOPTS");
    }

    #[test]
    fn test_ci_disables_interactive() {
        let env = Environment::empty("/").with_var("CI", "true");
        assert!(!Config::from_env(&env).interactive);
    }

    #[test]
    fn test_interactive_switch() {
        let off = Environment::empty("/").with_var("STRATUS_INTERACTIVE", "0");
        assert!(!Config::from_env(&off).interactive);

        let on = Environment::empty("/").with_var("STRATUS_INTERACTIVE", "1");
        assert!(Config::from_env(&on).interactive);
    }

    #[test]
    fn test_log_filter_and_color() {
        let env = Environment::empty("/")
            .with_var("STRATUS_LOG", "stratus=trace")
            .with_var("NO_COLOR", "");
        let config = Config::from_env(&env);
        assert_eq!(config.log_filter.as_deref(), Some("stratus=trace"));
        assert!(!config.color);
    }
}
