//! Strongbox CLI - Command line interface.

use std::io::{self, Read, Write};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use clap::{Parser, Subcommand};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use strongbox_crypto::MasterKey;

// ============================================================================
// CLI Structure
// ============================================================================

#[derive(Parser)]
#[command(name = "strongbox")]
#[command(about = "Strongbox CLI - Envelope encryption for small secrets")]
#[command(version)]
struct Cli {
    /// Strongbox server address
    #[arg(long, default_value = "http://localhost:8300", env = "STRONGBOX_ADDR")]
    addr: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new master key
    Keygen {
        /// Label to use instead of the derived id
        #[arg(long)]
        label: Option<String>,
    },
    /// Check server liveness
    Status,
    /// Create a DEK in a keyring
    CreateDek {
        /// Keyring name
        keyring: String,
    },
    /// List the DEKs of a keyring
    ListDeks {
        /// Keyring name
        keyring: String,
    },
    /// Show DEK metadata
    Describe {
        /// Keyring name
        keyring: String,
        /// DEK id
        key_id: String,
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Encrypt data (read from stdin if not provided)
    Encrypt {
        /// Keyring name
        #[arg(long)]
        keyring: String,
        /// DEK id
        #[arg(long)]
        key_id: String,
        /// Associated data, required again on decrypt
        #[arg(long, default_value = "")]
        aad: String,
        /// Data to encrypt
        data: Option<String>,
    },
    /// Decrypt a base64 envelope (read from stdin if not provided)
    Decrypt {
        /// Keyring name
        #[arg(long)]
        keyring: String,
        /// Associated data given at encryption time
        #[arg(long, default_value = "")]
        aad: String,
        /// Print the plaintext as base64 instead of raw bytes
        #[arg(long)]
        base64: bool,
        /// Base64 envelope
        envelope: Option<String>,
    },
    /// Re-encrypt a base64 envelope under another DEK
    Reencrypt {
        /// Keyring name
        #[arg(long)]
        keyring: String,
        /// Target DEK id
        #[arg(long)]
        to: String,
        /// Associated data given at encryption time
        #[arg(long, default_value = "")]
        aad: String,
        /// Base64 envelope
        envelope: Option<String>,
    },
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct LivenessResponse {
    status: String,
    version: String,
    primary_master_key_id: String,
    master_key_count: usize,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

#[derive(Serialize)]
struct CreateDekRequest<'a> {
    keyring: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateDekResponse {
    key_id: String,
}

#[derive(Debug, Deserialize)]
struct ListDeksResponse {
    key_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct DekMetadata {
    id: String,
    keyring: String,
    master_key_id: String,
    algorithm: String,
    created_at: u64,
}

#[derive(Serialize)]
struct EncryptRequest<'a> {
    keyring: &'a str,
    key_id: &'a str,
    plaintext: String,
    associated_data: String,
}

#[derive(Debug, Deserialize)]
struct EncryptResponse {
    envelope: String,
}

#[derive(Serialize)]
struct DecryptRequest<'a> {
    keyring: &'a str,
    envelope: &'a str,
    associated_data: String,
}

#[derive(Debug, Deserialize)]
struct DecryptResponse {
    plaintext: String,
}

#[derive(Serialize)]
struct ReEncryptRequest<'a> {
    keyring: &'a str,
    envelope: &'a str,
    associated_data: String,
    target_key_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct ReEncryptResponse {
    envelope: String,
    key_id: String,
}

// ============================================================================
// HTTP Client
// ============================================================================

struct StrongboxClient {
    client: Client,
    base_url: String,
}

impl StrongboxClient {
    fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn parse<T: DeserializeOwned>(resp: Response, action: &str) -> Result<T> {
        if !resp.status().is_success() {
            let status = resp.status();
            let error: ErrorResponse = resp.json().await.unwrap_or(ErrorResponse {
                error: status.to_string(),
                message: "Unknown error".into(),
            });
            bail!("{} failed ({}): {}", action, error.error, error.message);
        }

        resp.json().await.context("Failed to parse response")
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, action: &str) -> Result<T> {
        let resp = self
            .client
            .get(self.url(path))
            .send()
            .await
            .context("Failed to connect to server")?;

        Self::parse(resp, action).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        action: &str,
    ) -> Result<T> {
        let resp = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .context("Failed to connect to server")?;

        Self::parse(resp, action).await
    }
}

// ============================================================================
// Command Handlers
// ============================================================================

fn read_stdin_or(arg: Option<String>) -> Result<Vec<u8>> {
    match arg {
        Some(value) => Ok(value.into_bytes()),
        None => {
            let mut buf = Vec::new();
            io::stdin()
                .read_to_end(&mut buf)
                .context("Failed to read stdin")?;
            Ok(buf)
        },
    }
}

fn read_envelope(arg: Option<String>) -> Result<String> {
    let raw = read_stdin_or(arg)?;
    let envelope = String::from_utf8(raw).context("Envelope is not valid text")?;
    let envelope = envelope.trim().to_string();

    if envelope.is_empty() {
        bail!("Envelope cannot be empty");
    }

    Ok(envelope)
}

fn cmd_keygen(label: Option<&str>) -> Result<()> {
    let key = MasterKey::generate().context("Failed to generate master key")?;
    let encoded = BASE64.encode(key.as_bytes());

    let entry = match label {
        Some(label) => {
            if label.trim().is_empty() || label.contains(':') || label.contains(',') {
                bail!("Label cannot be empty or contain ':' or ','");
            }
            format!("{}:{}", label, encoded)
        },
        None => encoded,
    };

    println!("Master key id: {}", label.unwrap_or(key.id()));
    println!("Master key:    {}", entry);
    println!();
    println!("IMPORTANT: Store this key securely! Every DEK wrapped by it is lost without it.");
    println!("Prepend it to STRONGBOX_MASTER_KEYS (comma-separated) to make it the primary key.");

    Ok(())
}

async fn cmd_status(client: &StrongboxClient) -> Result<()> {
    let live: LivenessResponse = client.get("/v1/vault/liveness", "Status").await?;

    println!("Strongbox server status:");
    println!("  Status:         {}", live.status);
    println!("  Version:        {}", live.version);
    println!("  Primary key:    {}", live.primary_master_key_id);
    println!("  Master keys:    {}", live.master_key_count);

    Ok(())
}

async fn cmd_create_dek(client: &StrongboxClient, keyring: &str) -> Result<()> {
    let result: CreateDekResponse = client
        .post(
            "/v1/vault/create-dek",
            &CreateDekRequest { keyring },
            "Create DEK",
        )
        .await?;

    println!("{}", result.key_id);

    Ok(())
}

async fn cmd_list_deks(client: &StrongboxClient, keyring: &str) -> Result<()> {
    let result: ListDeksResponse = client
        .get(&format!("/v1/vault/keyrings/{}/deks", keyring), "List DEKs")
        .await?;

    if result.key_ids.is_empty() {
        println!("No DEKs found");
    } else {
        println!("DEKs in keyring '{}':", keyring);
        for key_id in &result.key_ids {
            println!("  {}", key_id);
        }
    }

    Ok(())
}

fn render_metadata(meta: Value, format: &str) -> Result<String> {
    match format {
        "json" => Ok(serde_json::to_string_pretty(&meta)?),
        "text" => {
            let meta: DekMetadata =
                serde_json::from_value(meta).context("Unexpected DEK metadata")?;
            Ok(format!(
                "DEK {}:\n  Keyring:    {}\n  Master key: {}\n  Algorithm:  {}\n  Created at: {} (unix ms)",
                meta.id, meta.keyring, meta.master_key_id, meta.algorithm, meta.created_at
            ))
        },
        _ => bail!("Unknown format '{}' (expected text or json)", format),
    }
}

async fn cmd_describe(
    client: &StrongboxClient,
    keyring: &str,
    key_id: &str,
    format: &str,
) -> Result<()> {
    let meta: Value = client
        .get(
            &format!("/v1/vault/keyrings/{}/deks/{}", keyring, key_id),
            "Describe DEK",
        )
        .await?;

    println!("{}", render_metadata(meta, format)?);

    Ok(())
}

async fn cmd_encrypt(
    client: &StrongboxClient,
    keyring: &str,
    key_id: &str,
    aad: &str,
    data: Option<String>,
) -> Result<()> {
    let plaintext = read_stdin_or(data)?;

    let result: EncryptResponse = client
        .post(
            "/v1/vault/encrypt",
            &EncryptRequest {
                keyring,
                key_id,
                plaintext: BASE64.encode(plaintext),
                associated_data: BASE64.encode(aad),
            },
            "Encrypt",
        )
        .await?;

    println!("{}", result.envelope);

    Ok(())
}

async fn cmd_decrypt(
    client: &StrongboxClient,
    keyring: &str,
    aad: &str,
    as_base64: bool,
    envelope: Option<String>,
) -> Result<()> {
    let envelope = read_envelope(envelope)?;

    let result: DecryptResponse = client
        .post(
            "/v1/vault/decrypt",
            &DecryptRequest {
                keyring,
                envelope: &envelope,
                associated_data: BASE64.encode(aad),
            },
            "Decrypt",
        )
        .await?;

    if as_base64 {
        println!("{}", result.plaintext);
        return Ok(());
    }

    let plaintext = BASE64
        .decode(&result.plaintext)
        .context("Server returned invalid base64")?;
    let mut stdout = io::stdout();
    stdout.write_all(&plaintext)?;
    stdout.flush()?;

    Ok(())
}

async fn cmd_reencrypt(
    client: &StrongboxClient,
    keyring: &str,
    target_key_id: &str,
    aad: &str,
    envelope: Option<String>,
) -> Result<()> {
    let envelope = read_envelope(envelope)?;

    let result: ReEncryptResponse = client
        .post(
            "/v1/vault/reencrypt",
            &ReEncryptRequest {
                keyring,
                envelope: &envelope,
                associated_data: BASE64.encode(aad),
                target_key_id,
            },
            "Re-encrypt",
        )
        .await?;

    eprintln!("Re-encrypted under {}", result.key_id);
    println!("{}", result.envelope);

    Ok(())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let client = StrongboxClient::new(&cli.addr)?;

    match cli.command {
        Commands::Keygen { label } => cmd_keygen(label.as_deref()),
        Commands::Status => cmd_status(&client).await,
        Commands::CreateDek { keyring } => cmd_create_dek(&client, &keyring).await,
        Commands::ListDeks { keyring } => cmd_list_deks(&client, &keyring).await,
        Commands::Describe {
            keyring,
            key_id,
            format,
        } => cmd_describe(&client, &keyring, &key_id, &format).await,
        Commands::Encrypt {
            keyring,
            key_id,
            aad,
            data,
        } => cmd_encrypt(&client, &keyring, &key_id, &aad, data).await,
        Commands::Decrypt {
            keyring,
            aad,
            base64,
            envelope,
        } => cmd_decrypt(&client, &keyring, &aad, base64, envelope).await,
        Commands::Reencrypt {
            keyring,
            to,
            aad,
            envelope,
        } => cmd_reencrypt(&client, &keyring, &to, &aad, envelope).await,
    }
}
