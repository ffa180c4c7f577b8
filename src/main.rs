use std::io::IsTerminal;
use stratus::builtin::{root_namespace, version_shortcut};
use stratus::prompt::LinePrompter;
use stratus::{Config, Environment, ExitCode, Executor, error, logging};

async fn run(env: Environment, argv: &[String]) -> anyhow::Result<ExitCode> {
    let executor = Executor::new(root_namespace()?, env);
    let executor = if std::io::stdin().is_terminal() {
        executor.with_prompter(LinePrompter)
    } else {
        executor
    };
    executor.execute(argv).await
}

#[tokio::main]
async fn main() {
    let env = Environment::new();
    let config = Config::from_env(&env);
    let argv = version_shortcut(std::env::args().skip(1).collect());
    logging::init(&config, logging::verbose_requested(&argv));

    let code = match run(env, &argv).await {
        Ok(code) => code,
        Err(err) => error::report(&err, &mut std::io::stderr()),
    };
    std::process::exit(code);
}
