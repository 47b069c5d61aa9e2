use clap::{Arg, Command};

use minigfs::config::load_config;
use minigfs::master;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let matches = Command::new("Master")
        .version("1.0")
        .about("Starts the mini-gfs master")
        .arg(
            Arg::new("address")
                .short('a')
                .long("address")
                .value_name("ADDR")
                .help("Address the master binds to (e.g. 0.0.0.0:8080)"),
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

    let mut master_config = config.master;
    if let Some(addr) = matches.get_one::<String>("address") {
        master_config.bind_addr = addr.clone();
    }

    tracing::info!("master starting on {}", master_config.bind_addr);
    let state = master::init(master_config, config.common).await;
    master::server::run(state).await?;

    Ok(())
}
