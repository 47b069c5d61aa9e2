use std::env;

use minigfs::client::Client;
use minigfs::config::load_config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut args: Vec<String> = env::args().skip(1).collect();
    let mut config_path = "config.toml".to_string();
    if let Some(pos) = args.iter().position(|a| a == "-c" || a == "--config") {
        args.remove(pos);
        if pos < args.len() {
            config_path = args.remove(pos);
        }
    }

    let config = load_config(&config_path)?;
    let client = Client::new(config.client, config.common);

    if args.is_empty() {
        eprintln!("Usage: client [-c <config path>] <command> [arguments]");
        eprintln!("Commands: upload <file_name>, download <chunk_id,chunk_id,...> <out_file>");
        return Ok(());
    }

    match args[0].as_str() {
        "upload" => {
            if args.len() < 2 {
                eprintln!("Usage: upload <file_name>");
                return Ok(());
            }
            if let Err(e) = upload_file(&client, &args[1]).await {
                eprintln!("Error: {}", e);
            }
        }
        "download" => {
            if args.len() < 3 {
                eprintln!("Usage: download <chunk_id,chunk_id,...> <out_file>");
                return Ok(());
            }
            if let Err(e) = download_file(&client, &args[1], &args[2]).await {
                eprintln!("Error: {}", e);
            }
        }
        other => {
            eprintln!("Invalid command '{}'. Available commands: upload, download", other);
        }
    }

    Ok(())
}

async fn upload_file(client: &Client, file_name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = tokio::fs::read(file_name).await.map_err(|e| {
        eprintln!("Failed to read file '{}': {}", file_name, e);
        e
    })?;

    let chunk_ids = client.upload(file_name, &bytes).await?;
    println!("Uploaded '{}' as chunks: {}", file_name, chunk_ids.join(","));

    Ok(())
}

async fn download_file(
    client: &Client,
    chunk_ids: &str,
    out_file: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let chunk_ids: Vec<String> = chunk_ids.split(',').map(String::from).collect();
    let bytes = client.download(&chunk_ids).await?;
    tokio::fs::write(out_file, &bytes).await.map_err(|e| {
        eprintln!("Failed to write '{}': {}", out_file, e);
        e
    })?;

    println!("Downloaded {} bytes to '{}'", bytes.len(), out_file);
    Ok(())
}
