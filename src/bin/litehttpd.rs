//! Minimal static file server built on the `litehttp` library crate.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use litehttp::fileserving::FileServingHandler;
use litehttp::index::HtmlDirectoryIndex;
use litehttp::server::{Server, ServerConfig};

#[derive(Parser)]
#[command(name = "litehttpd", about = "Embeddable HTTP/1.1 static file server", version)]
struct Cli {
    /// Directory to serve
    directory: PathBuf,

    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Directory-index filename tried before falling back to a listing
    #[arg(short, long, default_value = "index.html")]
    index: String,

    /// Extra `mime.types`-style file to extend the default MIME table
    #[arg(long, value_name = "FILE")]
    mime_types: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    if !cli.directory.is_dir() {
        eprintln!("litehttpd: {} is not a directory", cli.directory.display());
        std::process::exit(1);
    }

    let mut config = ServerConfig::default().port(cli.port);
    if let Some(path) = &cli.mime_types {
        config = config.mime_bootstrap(path.clone());
    }

    let mut server = Server::new(config)?;
    server.set_directory_index(Arc::new(HtmlDirectoryIndex));

    let handler = Arc::new(FileServingHandler::new(
        cli.directory.clone(),
        "/",
        Arc::clone(&server.mime_registry),
        Arc::clone(&server.directory_index),
        true,
    ));
    server.add_context("", "/", &["GET"], handler);

    let default_host = server.host_mut("");
    default_host.directory_index = Some(cli.index.clone());
    default_host.allow_generated_index = true;

    log::info!("serving {} on port {}", cli.directory.display(), cli.port);
    Arc::new(server).start().await
}
