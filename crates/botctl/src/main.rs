use anyhow::Result;
use common::config::Config;

mod cli;

#[tokio::main]
async fn main() -> Result<()> {
    let invocation = match cli::parse_args(std::env::args()).map_err(anyhow::Error::msg)? {
        cli::Parsed::Run(invocation) => invocation,
        cli::Parsed::Help => {
            println!("{}", cli::USAGE);
            return Ok(());
        }
    };

    let config_path = invocation
        .config_path
        .unwrap_or_else(Config::default_config_path);
    let config = Config::load(&config_path)?;

    let (dispatch, _otel_guard) = common::observability::build_dispatch(
        config.observability.service_name.clone(),
        &config.general.log_level,
        config.observability.json_logs,
    );
    tracing::dispatcher::set_global_default(dispatch).map_err(anyhow::Error::msg)?;

    tracing::debug!(path = %config_path, mode = %config.general.mode, "botctl starting");

    cli::run_command(&config, invocation.command).await
}
