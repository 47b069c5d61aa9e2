use clap::{Arg, Command};

use minigfs::chunkserver::server;
use minigfs::chunkserver::state::ChunkServerState;
use minigfs::config::load_config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let matches = Command::new("ChunkServer")
        .version("1.0")
        .about("Starts a mini-gfs chunk server")
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("Port this chunk server listens on"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("PATH")
                .help("Path to a TOML config file")
                .default_value("config.toml"),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config").unwrap();
    let config = load_config(config_path)?;

    let mut chunkserver_config = config.chunkserver;
    if let Some(port) = matches.get_one::<String>("port") {
        chunkserver_config.port = port.parse().expect("invalid --port value");
    }
    let port = chunkserver_config.port;

    tracing::info!(
        "chunk-server starting on port {} (data at '{}')",
        port,
        chunkserver_config.data_path
    );
    let state = std::sync::Arc::new(ChunkServerState::new(port, chunkserver_config, config.common));
    server::run(state).await?;

    Ok(())
}
