//! The REST service.

use std::net::SocketAddr;
use std::sync::Arc;

use mnagios_api::{ApiState, SettleSettings, build_router};
use mnagios_core::DaemonConfig;
use mnagios_groups::GroupManager;
use mnagios_status::NagiosStateReader;
use mnagios_store::{ConfigStore, Privilege, ProcessRunner};
use mnagios_targets::TargetManager;
use tracing::{info, warn};

/// The service runs as the Nagios user; instance-level objects need no
/// elevation.
const SERVICE_PRIVILEGE: Privilege = Privilege::Unprivileged;

pub async fn run(config: DaemonConfig, listen: Option<SocketAddr>) -> anyhow::Result<()> {
    info!("managed Nagios REST service starting");

    let store = Arc::new(ConfigStore::new(&config, Arc::new(ProcessRunner)));
    let reader = Arc::new(NagiosStateReader::from_config(&config));
    info!(objects = %config.nagios.objects_dir.display(), "configuration store opened");

    let state = ApiState {
        targets: Arc::new(TargetManager::new(
            Arc::clone(&store),
            Arc::clone(reader.cache()),
            &config.storage.rate_data_dir,
            SERVICE_PRIVILEGE,
        )),
        groups: Arc::new(GroupManager::new(store, SERVICE_PRIVILEGE)),
        reader,
        settle: SettleSettings::default(),
    };

    let addr = listen.unwrap_or(config.api.listen);
    info!(%addr, "API server starting");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("shutdown signal received"),
                Err(e) => {
                    warn!(error = %e, "no Ctrl-C handler; running until killed");
                    std::future::pending::<()>().await;
                }
            }
        })
        .await?;

    info!("managed Nagios REST service stopped");
    Ok(())
}
