use crate::config::Config;
use tracing_subscriber::{EnvFilter, fmt};

/// The filter directive in effect: `STRATUS_LOG` when set, otherwise
/// `debug` for `--verbose` runs and `warn` for everything else.
pub fn filter_directive(config: &Config, verbose: bool) -> String {
    match (&config.log_filter, verbose) {
        (Some(filter), _) => filter.clone(),
        (None, true) => "debug".to_string(),
        (None, false) => "warn".to_string(),
    }
}

/// Whether `--verbose` appears among the options of `argv`. Tokens after a
/// literal `--` belong to the command's passthrough and are not looked at.
pub fn verbose_requested(argv: &[String]) -> bool {
    argv.iter()
        .take_while(|arg| *arg != "--")
        .any(|arg| arg == "--verbose")
}

/// Install the stderr subscriber. Calling it again is a no-op.
pub fn init(config: &Config, verbose: bool) {
    let directive = filter_directive(config, verbose);
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|e| {
        eprintln!("Ignoring invalid log filter `{directive}`: {e}");
        EnvFilter::new("warn")
    });

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(config.color)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directive() {
        let mut config = Config::default();
        assert_eq!(filter_directive(&config, false), "warn");
        assert_eq!(filter_directive(&config, true), "debug");

        config.log_filter = Some("stratus::process=trace".into());
        assert_eq!(filter_directive(&config, false), "stratus::process=trace");
    }

    #[test]
    fn test_verbose_after_double_dash_is_passthrough() {
        let argv = |tokens: &[&str]| tokens.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert!(verbose_requested(&argv(&["build", "--verbose"])));
        assert!(!verbose_requested(&argv(&["build", "--", "--verbose"])));
        assert!(!verbose_requested(&argv(&["build"])));
    }

    #[test]
    fn test_init_twice_is_harmless() {
        let config = Config::default();
        init(&config, false);
        init(&config, true);
    }
}
