//! Startup composition: configuration in, running engine and bridge out.

use std::sync::Arc;

use ecrypto_config::EcryptoConfig;
use ecrypto_supervisor::EngineSupervisor;

use crate::bridge::EngineBridge;
use crate::error::ShellResult;

/// Launches the engine and builds the bridge around it.
///
/// A spawn failure is returned before any bridge exists, so the caller can
/// abort startup.
pub async fn bootstrap(config: &EcryptoConfig) -> ShellResult<EngineBridge> {
    let supervisor = Arc::new(EngineSupervisor::new(config.supervisor_config()));
    let readiness = supervisor.start().await?;
    tracing::info!(
        endpoint = %supervisor.endpoint().base_url(),
        pid = ?readiness.pid,
        signal = ?readiness.signal,
        "engine bridge ready"
    );

    Ok(EngineBridge::supervised(
        supervisor,
        config.gateway_config(),
        config.progress.buffer,
    ))
}
