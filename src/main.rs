use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use qr_attend::comms::http_api;
use qr_attend::config::{Config, MIN_GENERATED_SECRET_LEN, MIN_SECRET_LEN};
use qr_attend::security::{TokenIssuer, TokenVerifier, Verification};
use qr_attend::utils::logging;
use rand::RngCore;
use serde_json::json;
use std::net::IpAddr;
use tracing::info;

#[derive(Parser)]
#[command(name = "qr-attend", version, about = "Attendance QR token service")]
struct AppCli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Subcommands
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API (default)
    Serve {
        #[arg(long, default_value = "0.0.0.0")]
        host: IpAddr,
        /// Overrides the PORT environment variable
        #[arg(long)]
        port: Option<u16>,
    },
    /// Issue one token and print it as JSON
    Issue,
    /// Verify a token against the configured key and issuer
    Verify { token: String },
    /// Print a random hex secret for QR_JWT_SECRET
    GenSecret {
        #[arg(long, default_value_t = MIN_SECRET_LEN)]
        bytes: usize,
    },
}

fn load_config() -> Result<Config> {
    Config::from_env().context("loading configuration")
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = AppCli::parse();
    logging::init(&args.log_level);

    let command = args.command.unwrap_or(Commands::Serve {
        host: IpAddr::from([0, 0, 0, 0]),
        port: None,
    });

    match command {
        Commands::Serve { host, port } => {
            let config = load_config()?;
            let port = port.unwrap_or(config.port);
            info!("starting QR token service v{}", qr_attend::VERSION);
            http_api::serve(&config, host, port).await?;
        }
        Commands::Issue => {
            let config = load_config()?;
            let issued = TokenIssuer::new(&config.token).issue()?;
            println!("{}", serde_json::to_string_pretty(&issued)?);
        }
        Commands::Verify { token } => {
            let config = load_config()?;
            match TokenVerifier::new(&config.token).verify(Some(&token)) {
                Verification::Accepted(claims) => {
                    let out = json!({
                        "success": true,
                        "exp": claims.expires_at,
                        "iat": claims.issued_at,
                        "scope": claims.scope,
                        "jti": claims.token_id,
                    });
                    println!("{}", serde_json::to_string_pretty(&out)?);
                }
                Verification::Rejected(rejection) => bail!("{}", rejection),
            }
        }
        Commands::GenSecret { bytes } => {
            if bytes < MIN_GENERATED_SECRET_LEN {
                bail!(
                    "refusing to generate a secret shorter than {} bytes",
                    MIN_GENERATED_SECRET_LEN
                );
            }
            let mut buf = vec![0u8; bytes];
            rand::rng().fill_bytes(&mut buf);
            println!("{}", hex::encode(buf));
        }
    }

    Ok(())
}
