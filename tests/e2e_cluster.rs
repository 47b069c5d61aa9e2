//! End-to-end happy-path coverage: a real master and two real chunk
//! servers bound to ephemeral ports, talking over loopback HTTP, driven
//! through the client driver's `upload`/`download` (spec.md §8 scenario S1).

use minigfs::client::Client;
use minigfs::config::{ChunkServerConfig, ClientConfig, CommonConfig, MasterConfig};
use minigfs::{chunkserver, master};

fn tempdir(name: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("minigfs-e2e-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn small_common() -> CommonConfig {
    let mut common = CommonConfig::default();
    common.chunk_size = 16;
    common.apply_write_timeout = 5;
    common.copy_chunk_timeout = 5;
    common
}

fn bind_ephemeral() -> (std::net::TcpListener, u16) {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn upload_then_download_round_trips_bytes() {
    let common = small_common();
    let dir = tempdir("cluster");

    let (master_listener, master_port) = bind_ephemeral();
    let master_addr = format!("127.0.0.1:{}", master_port);

    let master_config = MasterConfig {
        bind_addr: master_addr.clone(),
        checkpoint_path: dir.join("checkpoint.json").to_string_lossy().into_owned(),
        oplog_path: dir.join("oplog.jsonl").to_string_lossy().into_owned(),
    };

    let master_state = master::init(master_config, common.clone()).await;
    tokio::spawn(master::server::serve(master_listener, master_state));

    for _ in 0..2 {
        let (cs_listener, cs_port) = bind_ephemeral();
        let cs_config = ChunkServerConfig {
            port: cs_port,
            master_addr: master_addr.clone(),
            data_path: dir.join(format!("cs-{}", cs_port)).to_string_lossy().into_owned(),
        };
        let cs_state = std::sync::Arc::new(chunkserver::state::ChunkServerState::new(
            cs_port,
            cs_config,
            common.clone(),
        ));
        tokio::spawn(chunkserver::server::serve(cs_listener, cs_state));
    }

    // give registration + the listeners a moment to come up
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;

    let client_config = ClientConfig {
        master_addr: master_addr.clone(),
    };
    let client = Client::new(client_config, common);

    let payload: Vec<u8> = (0u8..100).collect(); // spans several 16-byte chunks
    let chunk_ids = client
        .upload("round-trip.bin", &payload)
        .await
        .expect("upload should succeed with two live chunk servers");
    assert_eq!(chunk_ids.len(), 7); // ceil(100/16)

    let downloaded = client
        .download(&chunk_ids)
        .await
        .expect("download should succeed");
    assert_eq!(downloaded, payload);
}
