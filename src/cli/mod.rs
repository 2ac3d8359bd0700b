//! Command-line interface for scyllactl.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use tracing::debug;

use crate::backend::KubeBackend;
use crate::config::{parse_duration, CtlConfig};
use crate::context::{Context, SignalHandler};
use crate::dispatcher::{Client, ClusterRef, Dispatcher};
use crate::events::{self, DEFAULT_EVENT_CAPACITY};
use crate::output::{self, OutputFormat};
use crate::replace::ReplacementOptions;
use crate::status::ClusterStatusResult;

/// scyllactl - Operate ScyllaDB clusters running on Kubernetes.
#[derive(Debug, Parser)]
#[command(name = "scyllactl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(long, env = "SCYLLACTL_CONFIG")]
    pub config: Option<PathBuf>,

    /// ScyllaCluster name
    #[arg(short, long, env = "SCYLLA_CLUSTER_NAME")]
    pub cluster: Option<String>,

    /// Namespace of the ScyllaCluster
    #[arg(short, long, env = "SCYLLA_CLUSTER_NAMESPACE")]
    pub namespace: Option<String>,

    /// Kubeconfig file; defaults to KUBECONFIG or the in-cluster config
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum)]
    pub output: Option<OutputFormat>,

    /// Log level or filter directive (overridden by RUST_LOG)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Cluster operations
    Cluster {
        #[command(subcommand)]
        command: ClusterCommands,
    },
}

/// Cluster subcommands.
#[derive(Debug, Subcommand)]
pub enum ClusterCommands {
    /// Show the status of every node as seen by every member
    Status,

    /// Node operations
    Node {
        #[command(subcommand)]
        command: NodeCommands,
    },
}

/// Node subcommands.
#[derive(Debug, Subcommand)]
pub enum NodeCommands {
    /// Replace a failed node in the cluster
    ///
    /// Verifies the node is down, labels its member service for replacement,
    /// then waits for the pod to be recreated and the node to rejoin as
    /// Up/Normal.
    Replace(ReplaceArgs),
}

#[derive(Debug, Args)]
pub struct ReplaceArgs {
    /// Datacenter name
    #[arg(short, long)]
    pub datacenter: String,

    /// Node ordinal within the datacenter
    #[arg(short, long, value_parser = clap::value_parser!(i32).range(0..))]
    pub ordinal: i32,

    /// Polling interval for checking operation status
    #[arg(long, value_parser = parse_duration)]
    pub poll_interval: Option<Duration>,

    /// Timeout for the replacement operation
    #[arg(long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Layer flags over the file and environment configuration.
    pub fn resolve_config(&self) -> crate::Result<CtlConfig> {
        let mut config = CtlConfig::load(self.config.as_deref())?;

        if let Some(cluster) = &self.cluster {
            config.cluster.name = Some(cluster.clone());
        }
        if let Some(namespace) = &self.namespace {
            config.cluster.namespace = namespace.clone();
        }
        if let Some(kubeconfig) = &self.kubeconfig {
            config.cluster.kubeconfig = Some(kubeconfig.clone());
        }
        if let Some(format) = self.output {
            config.output.format = format;
        }
        if let Some(level) = &self.log_level {
            config.log.level = level.clone();
        }
        config.log.json |= self.json_logs;
        config.output.colors &= !self.no_color;

        let Commands::Cluster {
            command: ClusterCommands::Node {
                command: NodeCommands::Replace(args),
            },
        } = &self.command
        else {
            return Ok(config);
        };
        if let Some(interval) = args.poll_interval {
            config.replace.poll_interval = interval;
        }
        if let Some(timeout) = args.timeout {
            config.replace.timeout = timeout;
        }
        Ok(config)
    }
}

/// Run a parsed command line against the current Kubernetes context.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.resolve_config()?;
    crate::observability::init(&config.log)?;
    if !config.output.colors {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cluster = config.cluster_ref()?;
    debug!(cluster = %cluster, "Resolved target cluster");

    let ctx = Context::new();
    tokio::spawn(SignalHandler::new(ctx.clone()).run());

    let backend = KubeBackend::connect(config.cluster.kubeconfig.as_deref())
        .await
        .context("Failed to connect to Kubernetes")?;
    let dispatcher: Arc<dyn Dispatcher> = Arc::new(Client::new(backend));

    match cli.command {
        Commands::Cluster { command } => match command {
            ClusterCommands::Status => {
                let result = cluster_status(dispatcher, ctx, cluster, config.output.format).await?;
                output::print_status(&result, config.output.format)?;
            }
            ClusterCommands::Node {
                command: NodeCommands::Replace(args),
            } => {
                node_replace(
                    dispatcher,
                    ctx,
                    cluster,
                    args.datacenter,
                    args.ordinal,
                    config.replace,
                    config.output.format,
                )
                .await?;
            }
        },
    }

    Ok(())
}

/// Collect cluster status, printing events while the operation runs.
pub async fn cluster_status(
    dispatcher: Arc<dyn Dispatcher>,
    ctx: Context,
    cluster: ClusterRef,
    format: OutputFormat,
) -> anyhow::Result<ClusterStatusResult> {
    let (sink, mut stream) = events::channel(DEFAULT_EVENT_CAPACITY);
    let task = tokio::spawn(async move { dispatcher.cluster_status(&ctx, &cluster, sink).await });

    while let Some(event) = stream.recv().await {
        output::print_event(&event, format);
    }

    let result = task
        .await
        .context("Cluster status task panicked")?
        .context("Failed to get cluster status")?;
    Ok(result)
}

/// Replace a node, printing events while the operation runs.
pub async fn node_replace(
    dispatcher: Arc<dyn Dispatcher>,
    ctx: Context,
    cluster: ClusterRef,
    datacenter: String,
    ordinal: i32,
    options: ReplacementOptions,
    format: OutputFormat,
) -> anyhow::Result<()> {
    println!(
        "🔄 Starting node replacement for datacenter={}, ordinal={}\n",
        datacenter, ordinal
    );

    let (sink, mut stream) = events::channel(DEFAULT_EVENT_CAPACITY);
    let task = tokio::spawn(async move {
        dispatcher
            .node_replace(&ctx, &cluster, &datacenter, ordinal, options, sink)
            .await
    });

    while let Some(event) = stream.recv().await {
        output::print_event(&event, format);
    }

    task.await
        .context("Node replacement task panicked")?
        .context("Node replacement failed")?;

    println!();
    output::success("Node replacement completed successfully!");
    println!();
    output::print_kv(
        "Note",
        "You should run a repair using ScyllaDB Manager to ensure data consistency.",
    );
    Ok(())
}
