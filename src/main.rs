use std::sync::Arc;

use clap::Parser;

use tower_lsp::{LspService, Server};

use tracing::info;

use anchor_language_server::logging::init_logger;
use anchor_language_server::lsp::backend::AnchorBackend;
use anchor_language_server::lsp::engine::AnchorEngine;
use anchor_language_server::lsp::models::methods;

/// Language server for pattern-matched anchors: definitions, references and
/// the diagnostics between them.
#[derive(Parser, Debug)]
#[command(name = "anchor-language-server", version, about)]
struct Args {
    /// Communicate over stdin/stdout (the only transport)
    #[arg(long)]
    stdio: bool,

    /// Log level for stderr, e.g. "debug" or "anchor_language_server=trace"
    #[arg(long)]
    log_level: Option<String>,

    /// Disable ANSI colors on stderr
    #[arg(long)]
    no_color: bool,

    /// Do not write a session log to the cache directory
    #[arg(long)]
    no_file_logging: bool,

    /// Exit when this process goes away
    #[arg(long)]
    client_process_id: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _guard = init_logger(args.no_color, args.log_level.as_deref(), !args.no_file_logging)?;

    info!(
        "Starting {} {} (stdio: {})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        args.stdio
    );

    let engine = Arc::new(AnchorEngine::new());
    let client_process_id = args.client_process_id;

    let (service, socket) =
        LspService::build(|client| AnchorBackend::new(client, engine, client_process_id))
            .custom_method(methods::INIT, AnchorBackend::handle_init)
            .custom_method(methods::REFRESH, AnchorBackend::handle_refresh)
            .custom_method(methods::REFRESH_SETTINGS, AnchorBackend::handle_refresh_settings)
            .finish();

    Server::new(tokio::io::stdin(), tokio::io::stdout(), socket)
        .serve(service)
        .await;

    info!("Server stopped");
    Ok(())
}
