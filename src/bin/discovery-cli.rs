use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "discovery-cli")]
#[command(about = "Management CLI for the service discovery daemon", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check daemon liveness
    Status,
    /// List registered services
    Services {
        /// Only services with this status (unknown, healthy, unhealthy, stale)
        #[arg(short, long)]
        status: Option<String>,
    },
    /// Show one service (`name` or `name:instance`)
    Get { key: String },
    /// List every instance of a logical service
    Group { name: String },
    /// Register a service from a JSON file
    Register { file: std::path::PathBuf },
    /// Unregister a service
    Unregister { key: String },
    /// Run a health check now
    Check { key: String },
    /// Report a service alive
    Heartbeat { key: String },
    /// Show the dependency tree of a service
    Deps { key: String },
    /// List circular dependencies
    Cycles,
    /// Fleet health overview
    Overview,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let res = match cli.command {
        Commands::Status => client.get(format!("{base}/healthz")).send().await?,
        Commands::Services { status } => {
            let mut req = client.get(format!("{base}/services"));
            if let Some(status) = status {
                req = req.query(&[("status", status)]);
            }
            req.send().await?
        }
        Commands::Get { key } => client.get(format!("{base}/services/{key}")).send().await?,
        Commands::Group { name } => client.get(format!("{base}/groups/{name}")).send().await?,
        Commands::Register { file } => {
            let body: Value = serde_json::from_str(&std::fs::read_to_string(file)?)?;
            client.post(format!("{base}/services")).json(&body).send().await?
        }
        Commands::Unregister { key } => {
            client.delete(format!("{base}/services/{key}")).send().await?
        }
        Commands::Check { key } => {
            client.post(format!("{base}/services/{key}/check")).send().await?
        }
        Commands::Heartbeat { key } => {
            client.post(format!("{base}/services/{key}/heartbeat")).send().await?
        }
        Commands::Deps { key } => {
            client.get(format!("{base}/services/{key}/dependencies")).send().await?
        }
        Commands::Cycles => client.get(format!("{base}/dependencies/cycles")).send().await?,
        Commands::Overview => client.get(format!("{base}/overview")).send().await?,
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;

    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if !text.is_empty() {
            eprintln!("Details: {}", text);
        }
        std::process::exit(1);
    }

    if text.is_empty() {
        println!("{}", status);
        return Ok(());
    }

    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    Ok(())
}
