use std::path::PathBuf;

use clap::Parser;
use scimgate::{
    AppState, build_app,
    config::GatewayConfig,
    observability,
    scim::{ResourceKind, SchemaRegistry, ScimPath, compile},
};

#[derive(Parser, Debug)]
#[command(version, about = "SCIM 2.0 provisioning server", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file (defaults to ./scimgate.toml if it exists,
    /// otherwise built-in defaults)
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Start the SCIM server (default)
    Serve,
    /// Initialize a new configuration file
    Init {
        /// Path to create the config file (defaults to ./scimgate.toml)
        #[arg(short, long)]
        output: Option<String>,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Parse a SCIM attribute path or filter and print its structure
    Parse {
        /// The path or filter expression, e.g. `emails[type eq "work"].value`
        expression: String,
        /// Resource type to check the expression against
        #[arg(short, long, value_enum, default_value_t = ResourceArg::User)]
        resource: ResourceArg,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ResourceArg {
    User,
    Group,
}

impl From<ResourceArg> for ResourceKind {
    fn from(arg: ResourceArg) -> Self {
        match arg {
            ResourceArg::User => ResourceKind::User,
            ResourceArg::Group => ResourceKind::Group,
        }
    }
}

const DEFAULT_CONFIG_FILE: &str = "scimgate.toml";

#[tokio::main]
async fn main() {
    let args = Args::parse();

    match args.command {
        Some(Command::Init { output, force }) => run_init(output, force),
        Some(Command::Parse {
            expression,
            resource,
        }) => run_parse(&expression, resource.into()),
        Some(Command::Serve) | None => run_server(args.config.as_deref()).await,
    }
}

/// Load the configuration: an explicit path must exist, the default file is optional.
fn load_config(explicit_path: Option<&str>) -> Result<GatewayConfig, String> {
    if let Some(path) = explicit_path {
        let path = PathBuf::from(path);
        if !path.exists() {
            return Err(format!("Config file not found: {}", path.display()));
        }
        return GatewayConfig::from_file(&path).map_err(|e| e.to_string());
    }

    let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
    if default_path.exists() {
        GatewayConfig::from_file(&default_path).map_err(|e| e.to_string())
    } else {
        Ok(GatewayConfig::default())
    }
}

async fn run_server(config_path: Option<&str>) {
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = observability::init_tracing(&config.observability) {
        eprintln!("Failed to initialize tracing: {}", e);
        std::process::exit(1);
    }

    let addr = config.server.socket_addr();
    let app = build_app(AppState::new(config));

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to bind");
            std::process::exit(1);
        }
    };
    tracing::info!(address = %addr, "Server listening");

    // Graceful shutdown: stop accepting connections on SIGINT/SIGTERM, finish in-flight requests
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining in-flight requests");
}

fn run_init(output: Option<String>, force: bool) {
    let output_path = PathBuf::from(output.unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string()));

    if output_path.exists() && !force {
        eprintln!(
            "Config file already exists: {}\nUse --force to overwrite.",
            output_path.display()
        );
        std::process::exit(1);
    }

    if let Some(parent) = output_path.parent()
        && !parent.as_os_str().is_empty()
        && let Err(e) = std::fs::create_dir_all(parent)
    {
        eprintln!("Failed to create directory {}: {}", parent.display(), e);
        std::process::exit(1);
    }

    if let Err(e) = std::fs::write(&output_path, GatewayConfig::starter_toml()) {
        eprintln!("Failed to write config file: {}", e);
        std::process::exit(1);
    }

    println!("Created config file: {}", output_path.display());
    println!("Start the server with: scimgate --config {}", output_path.display());
}

fn run_parse(expression: &str, kind: ResourceKind) {
    let schema = SchemaRegistry::default();
    let path = match ScimPath::parse(expression, &schema) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    println!("normalized: {}", path.normalized());
    for (i, expr) in path.expressions().iter().enumerate() {
        println!("[{}] {}", i, expr);
        match expr.filter_node() {
            Ok(Some(node)) => println!("    filter: {:?}", node),
            Ok(None) => {}
            Err(e) => println!("    filter error: {}", e),
        }
    }

    if path.ends_with_filter() {
        match compile(&path, &schema, kind) {
            Ok(_) => println!("compiles against {}", kind.name()),
            Err(e) => {
                eprintln!("Error compiling against {}: {}", kind.name(), e);
                std::process::exit(1);
            }
        }
    }
}
