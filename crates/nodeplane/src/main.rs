mod commands;
mod manifest;
mod runtime;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nodeplane")]
#[command(about = "Provision cluster nodes and keep their reverse proxy in line", long_about = None)]
struct Cli {
    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Spawn instances and wait until they are running
    Spawn {
        /// Number of instances
        #[arg(short = 'n', long, default_value = "1")]
        count: usize,
        /// YAML or JSON mapping of provider credentials
        #[arg(long)]
        credentials: PathBuf,
        /// One role for every instance, or one per instance (comma separated)
        #[arg(long, value_delimiter = ',', required = true)]
        role: Vec<String>,
        /// Disk for the n-th instance; repeat for more
        #[arg(long)]
        disk: Vec<String>,
    },
    /// Terminate instances
    Terminate {
        /// YAML or JSON mapping of provider credentials
        #[arg(long)]
        credentials: PathBuf,
        /// Instance ids
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Attach a persistent disk to an instance
    AttachDisk {
        /// YAML or JSON mapping of provider credentials
        #[arg(long)]
        credentials: PathBuf,
        #[arg(long)]
        disk: String,
        #[arg(long)]
        instance: String,
    },
    /// List the queues in use on the provisioning endpoint
    Queues,
    /// Manage the local reverse proxy
    #[command(subcommand)]
    Proxy(ProxyCommands),
    /// Show version
    Version,
}

#[derive(Subcommand)]
enum ProxyCommands {
    /// Print the config an application manifest renders to
    Render {
        #[arg(long)]
        app: String,
        /// YAML routing manifest (endpoints, handlers, language)
        #[arg(long)]
        manifest: PathBuf,
    },
    /// Render an application manifest and apply it if it changed
    Apply {
        #[arg(long)]
        app: String,
        /// YAML routing manifest (endpoints, handlers, language)
        #[arg(long)]
        manifest: PathBuf,
    },
    /// Remove an application's config
    Remove {
        #[arg(long)]
        app: String,
    },
    /// Route a path of a platform service to a backend
    AddService {
        #[arg(long)]
        service: String,
        #[arg(long)]
        host: String,
        #[arg(long)]
        port: u16,
        #[arg(long)]
        listen_port: u16,
        #[arg(long, default_value = "/")]
        path: String,
    },
    /// Create directories, install certificates and the main config
    Init,
    /// Remove every application config
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so rendered configs on stdout stay clean
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Version => {
            println!("nodeplane {}", env!("CARGO_PKG_VERSION"));
        }
        command => {
            let runtime = runtime::Runtime::load()?;
            dispatch(&runtime, command).await?;
        }
    }

    Ok(())
}

async fn dispatch(runtime: &runtime::Runtime, command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Spawn {
            count,
            credentials,
            role,
            disk,
        } => commands::instances::spawn(runtime, count, &credentials, role, disk).await,
        Commands::Terminate { credentials, ids } => {
            commands::instances::terminate(runtime, &credentials, ids).await
        }
        Commands::AttachDisk {
            credentials,
            disk,
            instance,
        } => commands::instances::attach_disk(runtime, &credentials, &disk, &instance).await,
        Commands::Queues => commands::instances::queues(runtime).await,
        Commands::Proxy(proxy) => match proxy {
            ProxyCommands::Render { app, manifest } => {
                commands::proxy::render(runtime, &app, &manifest)
            }
            ProxyCommands::Apply { app, manifest } => {
                commands::proxy::apply(runtime, &app, &manifest).await
            }
            ProxyCommands::Remove { app } => commands::proxy::remove(runtime, &app).await,
            ProxyCommands::AddService {
                service,
                host,
                port,
                listen_port,
                path,
            } => {
                commands::proxy::add_service(runtime, &service, &host, port, listen_port, &path)
                    .await
            }
            ProxyCommands::Init => commands::proxy::init(runtime).await,
            ProxyCommands::Clear => commands::proxy::clear(runtime).await,
        },
        Commands::Version => {
            unreachable!("Version is handled before config loading");
        }
    }
}
