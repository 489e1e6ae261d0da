use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "proxy-cli")]
#[command(about = "Management CLI for the director proxy", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, default_value = "admin-secret-key")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check proxy status and the active director chain
    Status,
    /// List rate-limit groups
    Groups,
    /// Create or replace a rate-limit group
    SetGroup {
        name: String,
        #[arg(long)]
        max_rps: u32,
        #[arg(long)]
        burst: u32,
        #[arg(long, default_value_t = 60)]
        expiration_secs: u64,
    },
    /// Delete a rate-limit group
    DelGroup { name: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let groups_url = format!("{}/admin/ratelimit/groups", cli.url);
    let res = match cli.command {
        Commands::Status => {
            client
                .get(format!("{}/admin/status", cli.url))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Groups => client.get(groups_url).headers(headers).send().await?,
        Commands::SetGroup {
            name,
            max_rps,
            burst,
            expiration_secs,
        } => {
            client
                .put(format!("{}/{}", groups_url, name))
                .headers(headers)
                .json(&json!({
                    "max_rps": max_rps,
                    "burst": burst,
                    "expiration_secs": expiration_secs,
                }))
                .send()
                .await?
        }
        Commands::DelGroup { name } => {
            client
                .delete(format!("{}/{}", groups_url, name))
                .headers(headers)
                .send()
                .await?
        }
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let text = res.text().await?;
    if text.is_empty() {
        println!("{}", status);
        return Ok(());
    }
    let json: Value = serde_json::from_str(&text)?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
