//! `ecos-timer` binary.
//!
//! # Usage
//!
//! ```bash
//! ECOS_ADMIN_TOKENS=alice:s3cret ecos-timer --port 4000 -v
//! ```

use clap::Parser;
use ecos_timer::Args;
use ecos_timer::logging::init_logging;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging(args.log_format, args.verbose);

    let auth = args.authenticator()?;
    if auth.is_empty() {
        tracing::warn!("no admin tokens configured, sessions cannot be created");
    }

    let server = args.server_builder().build(auth).await?;
    tracing::info!(addr = %server.local_addr()?, tick_ms = args.tick_ms, "listening");

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    Ok(())
}
