use std::io::Write;

use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "log-relay-cli")]
#[command(about = "Client for the log relay", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream the logs of a workload
    Logs {
        namespace: String,
        name: String,

        #[arg(short, long)]
        container: Option<String>,

        /// Keep the stream open for new output
        #[arg(short, long)]
        follow: bool,

        /// Only the last N lines
        #[arg(long)]
        tail: Option<i64>,

        #[arg(long)]
        since_seconds: Option<i64>,

        #[arg(long)]
        timestamps: bool,

        /// Logs of the previous container instance
        #[arg(short, long)]
        previous: bool,

        #[arg(long)]
        insecure_skip_tls_verify_backend: bool,
    },
    /// Check relay health and registry status
    Health,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Logs {
            namespace,
            name,
            container,
            follow,
            tail,
            since_seconds,
            timestamps,
            previous,
            insecure_skip_tls_verify_backend,
        } => {
            let mut query: Vec<(&str, String)> = Vec::new();
            if let Some(container) = container {
                query.push(("container", container));
            }
            if follow {
                query.push(("follow", "true".into()));
            }
            if let Some(tail) = tail {
                query.push(("tailLines", tail.to_string()));
            }
            if let Some(seconds) = since_seconds {
                query.push(("sinceSeconds", seconds.to_string()));
            }
            if timestamps {
                query.push(("timestamps", "true".into()));
            }
            if previous {
                query.push(("previous", "true".into()));
            }
            if insecure_skip_tls_verify_backend {
                query.push(("insecureSkipTLSVerifyBackend", "true".into()));
            }

            let res = client
                .get(format!(
                    "{}/api/v1/namespaces/{}/workloads/{}/log",
                    cli.url, namespace, name
                ))
                .query(&query)
                .send()
                .await?;
            stream_response(res).await?;
        }
        Commands::Health => {
            let res = client.get(format!("{}/healthz", cli.url)).send().await?;
            println!("health: {}", res.text().await?.trim());

            let res = client.get(format!("{}/status", cli.url)).send().await?;
            print_json(res).await?;
        }
    }

    Ok(())
}

async fn stream_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: relay returned status {}", status);
        return print_json(res).await;
    }

    let mut stdout = std::io::stdout().lock();
    let mut body = std::pin::pin!(res.bytes_stream());
    while let Some(chunk) = body.next().await {
        stdout.write_all(&chunk?)?;
        stdout.flush()?;
    }
    Ok(())
}

async fn print_json(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let text = res.text().await?;
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    Ok(())
}
