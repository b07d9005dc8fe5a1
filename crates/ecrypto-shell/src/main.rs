use std::sync::Arc;

use anyhow::Result;
use ecrypto_shell::cli::{parse_cli_args, resolve_config, CliCommand, CLI_HELP};
use ecrypto_shell::logging::init_logging;
use ecrypto_shell::stdio::serve;

#[tokio::main]
async fn main() -> Result<()> {
    let flags = match parse_cli_args(std::env::args().skip(1))? {
        CliCommand::Run(flags) => flags,
        CliCommand::Help => {
            println!("{CLI_HELP}");
            return Ok(());
        }
    };
    let config = resolve_config(&flags)?;
    init_logging(&config.logging)?;
    tracing::info!(
        binary = %config.engine.binary,
        port = config.engine.port,
        "starting ecrypto shell"
    );

    let bridge = match ecrypto_shell::bootstrap(&config).await {
        Ok(bridge) => Arc::new(bridge),
        Err(error) => {
            tracing::error!(error = %error, "engine failed to start");
            return Err(error.into());
        }
    };

    let interrupt = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %error, "failed to listen for interrupt");
            std::future::pending::<()>().await;
        }
    };
    let outcome = tokio::select! {
        result = serve(Arc::clone(&bridge), tokio::io::stdin(), tokio::io::stdout()) => result,
        () = interrupt => {
            tracing::info!("interrupt received");
            Ok(())
        }
    };

    bridge.shutdown().await;
    tracing::info!("ecrypto shell stopped");
    outcome?;
    Ok(())
}
