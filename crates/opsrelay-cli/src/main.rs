mod bootstrap_helpers;

use anyhow::Result;
use clap::Parser;
use opsrelay_access::sha256_hex;
use opsrelay_cli::{run_relay, Cli};

use crate::bootstrap_helpers::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if let Some(secret) = cli.hash_secret.as_deref() {
        println!("{}", sha256_hex(secret));
        return Ok(());
    }
    init_tracing();
    run_relay(cli).await
}
