//! calcflow: run form calculations against a CalcEngine service.

use calcflow_cli::ui::print_error;
use calcflow_lib::{app, config, errors};

#[tokio::main]
async fn main() {
    let config = config::AppConfig::parse();

    let level = if config.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    let code = match app::run(&config).await {
        Ok(code) => code,
        Err(err) => {
            print_error(&format!("{err:#}"));
            errors::exit_code_for(&err)
        }
    };
    std::process::exit(code);
}
