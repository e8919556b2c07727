//! nodenet-agent - one-shot host-network reconciliation for a Kubernetes node.
//!
//! Reads the node object, derives the policy-routing feature from it and
//! applies (or resets) that feature on the local host.

mod config;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use k8s_openapi::api::core::v1::Node;
use nodenet::node::KubeNodeSource;
use nodenet::policy_routing::policy_routing_set;
use nodenet::{Ensure, LocalRouteState, Set, SystemHost, fill_local_rules_from_node};
use serde::Serialize;
use tracing::info;

use crate::config::AgentConfig;

#[derive(Parser)]
#[command(name = "nodenet-agent", version, about = "Node network reconciliation")]
struct Cli {
    /// Configuration file (YAML).
    #[arg(short, long, env = "NODENET_CONFIG")]
    config: Option<PathBuf>,

    /// Name of the node this agent runs on.
    #[arg(long, env = "NODE_NAME")]
    node_name: Option<String>,

    /// Read the node object from a YAML or JSON file instead of the API server.
    #[arg(long, conflicts_with = "node_name")]
    node_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Converge the host to the configured features.
    Apply,

    /// Remove everything the features install.
    Reset,

    /// Print the derived state and feature without touching the host.
    Show {
        /// Output format.
        #[arg(short, long, value_enum, default_value = "yaml")]
        format: OutputFormat,
    },
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Serialize)]
struct Plan<'a> {
    state: &'a LocalRouteState,
    feature: &'a Set,
}

async fn local_state(cli: &Cli) -> anyhow::Result<LocalRouteState> {
    if let Some(ref path) = cli.node_file {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        // YAML is a superset of JSON.
        let node: Node = serde_yaml::from_str(&text)
            .with_context(|| format!("parsing node object {}", path.display()))?;
        return Ok(LocalRouteState::from_node(&node)?);
    }

    let name = cli
        .node_name
        .as_deref()
        .context("--node-name (or NODE_NAME) is required without --node-file")?;
    let client = kube::Client::try_default()
        .await
        .context("building Kubernetes client")?;
    Ok(fill_local_rules_from_node(&KubeNodeSource::new(client), name).await?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let config = AgentConfig::load(cli.config.as_deref())?;
    let state = local_state(&cli).await?;
    let feature = policy_routing_set(&config.policy_routing, &state)?;

    match cli.command {
        Command::Show { format } => {
            let plan = Plan {
                state: &state,
                feature: &feature,
            };
            match format {
                OutputFormat::Yaml => print!("{}", serde_yaml::to_string(&plan)?),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plan)?),
            }
        }
        Command::Apply => {
            // Netlink and iptables calls block.
            tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
                let host = SystemHost::new()?;
                feature.reconcile(&host)?;
                info!(feature = %feature.feature_name, enabled = feature.enabled, "host converged");
                Ok(())
            })
            .await??;
        }
        Command::Reset => {
            tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
                let host = SystemHost::new()?;
                feature.ensure(&host, false)?;
                info!(feature = %feature.feature_name, "host reset");
                Ok(())
            })
            .await??;
        }
    }

    Ok(())
}
