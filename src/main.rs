use clap::{Parser, Subcommand, ValueEnum};
use fleetdeck::logging::root_logger;
use fleetdeck::runtime::BoxError;
use fleetdeck::{AgentConfig, AgentRuntime, DispatcherConfig, DispatcherRuntime, RuntimeKind};
use slog::{error, info};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;

#[derive(Parser, Debug)]
#[command(name = "fleetdeck")]
#[command(about = "Deploy and operate an application across clusters of servers", long_about = None)]
struct Args {
    #[command(subcommand)]
    role: Role,
}

#[derive(Subcommand, Debug)]
enum Role {
    /// Client-facing control node that fans commands out to the agents
    Dispatcher {
        /// Address to listen on (e.g., 0.0.0.0:7000)
        #[arg(short = 'l', long)]
        listen: SocketAddr,

        /// Fleet configuration file, created by the first configure if absent
        #[arg(short, long)]
        topology: PathBuf,

        /// API token accepted on protected routes (repeatable)
        #[arg(long = "token")]
        tokens: Vec<String>,

        /// File with one API token per line
        #[arg(long)]
        token_file: Option<PathBuf>,

        /// Agent port for servers that declare no control-port
        #[arg(long, default_value_t = 8080)]
        node_port: u16,

        /// Timeout for each node call
        #[arg(long, default_value_t = 30)]
        node_timeout_secs: u64,

        /// Node calls in flight at once
        #[arg(long, default_value_t = 16)]
        max_parallel: usize,
    },

    /// Per-server agent driving the local containers
    Agent {
        /// Address to listen on (e.g., 0.0.0.0:8080)
        #[arg(short = 'l', long)]
        listen: SocketAddr,

        /// Directory for config.json and the generated deployment files
        #[arg(short, long)]
        workdir: PathBuf,

        /// Container runtime to drive
        #[arg(long, value_enum, default_value_t = RuntimeArg::Docker)]
        runtime: RuntimeArg,

        /// Docker-compatible binary used by the docker runtime
        #[arg(long, default_value = "docker")]
        docker_binary: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum RuntimeArg {
    Docker,
    Memory,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let logger = root_logger();
    let args = Args::parse();

    match args.role {
        Role::Dispatcher {
            listen,
            topology,
            tokens,
            token_file,
            node_port,
            node_timeout_secs,
            max_parallel,
        } => {
            let mut config = DispatcherConfig::new(listen, topology)
                .with_tokens(tokens)
                .with_node_port(node_port)
                .with_node_timeout(Duration::from_secs(node_timeout_secs))
                .with_max_parallel(max_parallel);
            if let Some(path) = token_file {
                config = config.with_token_file(path);
            }

            let runtime = DispatcherRuntime::start(config, logger.clone())
                .await
                .map_err(|e| {
                    error!(logger, "Failed to start dispatcher"; "error" => %e);
                    e
                })?;

            info!(logger, "Press Ctrl+C to shut down");
            signal::ctrl_c().await?;
            runtime.shutdown();
        }
        Role::Agent {
            listen,
            workdir,
            runtime,
            docker_binary,
        } => {
            let kind = match runtime {
                RuntimeArg::Docker => RuntimeKind::Docker {
                    binary: docker_binary,
                },
                RuntimeArg::Memory => RuntimeKind::Memory,
            };
            let config = AgentConfig::new(listen, workdir).with_runtime(kind);

            let runtime = AgentRuntime::start(config, logger.clone())
                .await
                .map_err(|e| {
                    error!(logger, "Failed to start agent"; "error" => %e);
                    e
                })?;

            info!(logger, "Press Ctrl+C to shut down");
            signal::ctrl_c().await?;
            runtime.shutdown();
        }
    }

    Ok(())
}
