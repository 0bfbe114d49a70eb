//! mnagiosd — the managed Nagios daemon.
//!
//! Single binary that assembles the managed Nagios layers:
//! - REST service orchestration workflows call to add and remove targets
//! - Reconciliation against the orchestration manager
//! - Target type and group type administration
//!
//! # Usage
//!
//! ```text
//! mnagiosd --config /etc/nagios/mnagios.toml serve
//! mnagiosd reconcile --only-tenant default_tenant --skip-monitored
//! mnagiosd target-type create vm.json
//! mnagiosd group-type delete web
//! ```

mod admin;
mod serve;

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use mnagios_core::DaemonConfig;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mnagiosd", about = "Managed Nagios daemon")]
struct Cli {
    /// Configuration file; defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the REST service.
    Serve {
        /// Address to listen on, overriding `[api] listen`.
        #[arg(long)]
        listen: Option<SocketAddr>,
    },

    /// Restart monitoring for every monitored deployment.
    Reconcile {
        #[arg(long = "only-tenant")]
        only_tenants: Vec<String>,

        #[arg(long = "only-deployment")]
        only_deployments: Vec<String>,

        /// Only nodes Nagios does not already monitor.
        #[arg(long)]
        skip_monitored: bool,
    },

    /// Manage target types.
    TargetType {
        #[command(subcommand)]
        action: TypeAction,
    },

    /// Manage group types.
    GroupType {
        #[command(subcommand)]
        action: TypeAction,
    },
}

#[derive(Subcommand, Debug, PartialEq)]
enum TypeAction {
    /// Create from a JSON specification file.
    Create { spec: PathBuf },
    Delete { name: String },
    List,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,mnagios=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);
    let config = DaemonConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Serve { listen } => serve::run(config, listen).await,
        Command::Reconcile {
            only_tenants,
            only_deployments,
            skip_monitored,
        } => {
            let filter = mnagios_reconcile::ReconcileFilter {
                only_tenants,
                only_deployments,
                skip_monitored,
            };
            admin::reconcile(&config, &filter).await
        }
        Command::TargetType { action } => admin::target_type(&config, action),
        Command::GroupType { action } => admin::group_type(&config, action),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_reconcile_filters() {
        let cli = Cli::try_parse_from([
            "mnagiosd",
            "--config",
            "/etc/nagios/mnagios.toml",
            "reconcile",
            "--only-tenant",
            "t1",
            "--only-tenant",
            "t2",
            "--skip-monitored",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/nagios/mnagios.toml")));
        match cli.command {
            Command::Reconcile {
                only_tenants,
                only_deployments,
                skip_monitored,
            } => {
                assert_eq!(only_tenants, vec!["t1", "t2"]);
                assert!(only_deployments.is_empty());
                assert!(skip_monitored);
            }
            _ => panic!("expected reconcile"),
        }
    }

    #[test]
    fn parses_type_actions() {
        let cli = Cli::try_parse_from(["mnagiosd", "group-type", "delete", "web", "--log-json"]).unwrap();
        assert!(cli.log_json);
        match cli.command {
            Command::GroupType { action } => assert_eq!(action, TypeAction::Delete { name: "web".into() }),
            _ => panic!("expected group-type"),
        }
        assert!(Cli::try_parse_from(["mnagiosd", "target-type", "create"]).is_err());
    }
}
