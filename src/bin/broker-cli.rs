use clap::{Parser, Subcommand};
use reqwest::StatusCode;

#[derive(Parser)]
#[command(name = "broker-cli")]
#[command(about = "Command line client for the fsqueue broker", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enqueue a payload
    Put { queue: String, payload: String },
    /// Dequeue one payload and print it
    Get { queue: String },
    /// Check that the broker answers
    Ping,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let res = match &cli.command {
        Commands::Put { queue, payload } => {
            client
                .put(format!("{base}/queue/{queue}"))
                .body(payload.clone())
                .send()
                .await?
        }
        Commands::Get { queue } => client.get(format!("{base}/queue/{queue}")).send().await?,
        Commands::Ping => client.get(format!("{base}/ping")).send().await?,
    };

    let status = res.status();
    if matches!(cli.command, Commands::Get { .. }) && status == StatusCode::NOT_FOUND {
        eprintln!("queue empty");
        std::process::exit(2);
    }

    let body = res.text().await?;
    if !status.is_success() {
        eprintln!("Error: broker returned status {}", status);
        if !body.is_empty() {
            eprintln!("{}", body);
        }
        std::process::exit(1);
    }

    println!("{}", body);
    Ok(())
}
