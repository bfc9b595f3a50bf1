use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use code_analysis::config::GraphConfig;
use code_analysis::errors::{CodeAnalysisError, Result};
use code_analysis::graph::Neo4jStore;
use code_analysis::mcp::tools::run_tool;
use code_analysis::mcp::{McpServer, Tool};
use code_analysis::service::QueryService;

/// Code analytics over a Neo4j code graph, served over MCP.
#[derive(Parser)]
#[command(
    name = "code-analysis-server",
    version,
    about = "Code analytics over a Neo4j code graph, served over MCP"
)]
struct Cli {
    /// Graph database URI (overrides GRAPH_URI)
    #[arg(long, global = true)]
    uri: Option<String>,
    /// Graph database user (overrides GRAPH_USER)
    #[arg(long, global = true)]
    user: Option<String>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the MCP server on stdio (default)
    Serve,
    /// Check that the graph database is reachable
    Check,
    /// Run one tool and print its JSON result
    Query {
        /// Tool name, e.g. get_code_summary
        tool: String,
    },
}

#[tokio::main]
async fn main() {
    init_logging();
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Logs go to stderr; stdout carries the protocol.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = GraphConfig::from_env()?.with_overrides(cli.uri, cli.user);
    let service = QueryService::connect(&config).await?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(service).await,
        Commands::Check => {
            let connected = service.verify_connection().await;
            service.close().await?;
            if !connected {
                return Err(CodeAnalysisError::graph(
                    "verify_connection",
                    "Failed to connect to graph database",
                ));
            }
            println!("Connected to {}", config.uri);
            Ok(())
        }
        Commands::Query { tool } => {
            let tool = Tool::from_name(&tool).ok_or_else(|| CodeAnalysisError::Config {
                message: format!("unknown tool: {tool}"),
            })?;
            let output = run_tool(&service, tool).await;
            service.close().await?;
            println!("{}", output?);
            Ok(())
        }
    }
}

async fn serve(service: QueryService<Neo4jStore>) -> Result<()> {
    let server = Arc::new(McpServer::new(service));
    server.ensure_connected().await?;

    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    info!("Code Analysis MCP server running on stdio");

    let outcome = tokio::select! {
        res = Arc::clone(&server).serve(stdin, &mut stdout) => res,
        _ = shutdown_signal() => Ok(()),
    };

    server.shutdown(&mut stdout).await;
    outcome?;

    // A pending stdin read would otherwise hold the runtime open.
    process::exit(0);
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
