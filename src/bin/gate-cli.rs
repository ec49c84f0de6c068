use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Method, RequestBuilder};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "gate-cli")]
#[command(about = "Management CLI for the API gate", long_about = None)]
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
    /// Check gate status and active policies
    Status,
    /// Get (or create) the token of a subject
    Token { subject_id: u64 },
    /// Replace a subject's token with a new one
    Rotate { subject_id: u64 },
    /// Revoke a token
    Revoke { token: String },
    /// Revoke whatever token a subject holds
    Logout { subject_id: u64 },
    /// Allow an account to log in again
    Activate { subject_id: u64 },
    /// Block an account's logins and revoke its token
    Deactivate { subject_id: u64 },
    /// Show usage-table size, or one subject's current window
    Usage { subject_id: Option<u64> },
    /// Drop expired usage windows
    Purge,
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

    let request = |method: Method, path: String| -> RequestBuilder {
        client
            .request(method, format!("{}{}", cli.url, path))
            .headers(headers.clone())
    };

    let res = match cli.command {
        Commands::Status => request(Method::GET, "/admin/status".into()),
        Commands::Token { subject_id } => request(Method::POST, "/admin/tokens".into())
            .json(&json!({ "subject_id": subject_id })),
        Commands::Rotate { subject_id } => {
            request(Method::POST, format!("/admin/subjects/{}/rotate", subject_id))
        }
        Commands::Revoke { token } => request(Method::DELETE, format!("/admin/tokens/{}", token)),
        Commands::Logout { subject_id } => {
            request(Method::DELETE, format!("/admin/subjects/{}/token", subject_id))
        }
        Commands::Activate { subject_id } => {
            request(Method::PUT, format!("/admin/accounts/{}/active", subject_id))
                .json(&json!({ "active": true }))
        }
        Commands::Deactivate { subject_id } => {
            request(Method::PUT, format!("/admin/accounts/{}/active", subject_id))
                .json(&json!({ "active": false }))
        }
        Commands::Usage { subject_id: None } => request(Method::GET, "/admin/usage".into()),
        Commands::Usage {
            subject_id: Some(id),
        } => request(Method::GET, format!("/admin/usage/subjects/{}", id)),
        Commands::Purge => request(Method::POST, "/admin/usage/purge".into()),
    }
    .send()
    .await?;

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

    if status == reqwest::StatusCode::NO_CONTENT {
        println!("OK");
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
