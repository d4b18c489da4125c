//! End-to-end smoke tests: real TCP producers against a full pipeline
//! with the file sink writing into a temp directory.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use bulk_pipeline::{Pipeline, PipelineConfig};
use bulk_server::{TcpServer, TcpServerConfig, ViolationPolicy};
use bulk_sinks::{ConsoleConfig, FileSinkConfig};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

async fn start_server(port: u16, block_size: usize, output_dir: &std::path::Path) -> (Arc<Pipeline>, CancellationToken) {
    let pipeline = Arc::new(Pipeline::new(PipelineConfig {
        block_size: NonZeroUsize::new(block_size).unwrap(),
        console: ConsoleConfig::no_color(),
        file: FileSinkConfig::with_directory(output_dir),
        shutdown_grace: Duration::from_secs(1),
    }));

    let server = TcpServer::new(
        TcpServerConfig {
            address: "127.0.0.1".into(),
            port,
            violation_policy: ViolationPolicy::CloseConnection,
            ..TcpServerConfig::default()
        },
        Arc::clone(&pipeline),
    );

    let cancel = CancellationToken::new();
    tokio::spawn(server.run(cancel.clone()));

    // Wait for the listener to come up
    for _ in 0..100 {
        if TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
            return (pipeline, cancel);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("server did not start listening on port {port}");
}

async fn block_files(dir: &std::path::Path) -> Vec<std::path::PathBuf> {
    let mut files = Vec::new();
    if let Ok(mut entries) = tokio::fs::read_dir(dir).await {
        while let Ok(Some(entry)) = entries.next_entry().await {
            files.push(entry.path());
        }
    }
    files.sort();
    files
}

async fn wait_for_files(dir: &std::path::Path, count: usize) -> Vec<std::path::PathBuf> {
    for _ in 0..200 {
        let files = block_files(dir).await;
        if files.len() >= count {
            return files;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "expected {count} block files in {}, found {:?}",
        dir.display(),
        block_files(dir).await
    );
}

#[tokio::test]
async fn static_blocks_land_on_disk() {
    let output = tempfile::tempdir().unwrap();
    let (_pipeline, cancel) = start_server(39641, 3, output.path()).await;

    let mut producer = TcpStream::connect(("127.0.0.1", 39641)).await.unwrap();
    producer.write_all(b"cmd1\ncmd2\ncmd3\n\x04").await.unwrap();

    let files = wait_for_files(output.path(), 1).await;
    let contents = tokio::fs::read_to_string(&files[0]).await.unwrap();
    assert_eq!(contents, "cmd1\ncmd2\ncmd3\n");

    let name = files[0].file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("bulk") && name.ends_with(".log"), "{name}");

    cancel.cancel();
}

#[tokio::test]
async fn scoped_block_flushes_on_close_delimiter() {
    let output = tempfile::tempdir().unwrap();
    let (_pipeline, cancel) = start_server(39642, 10, output.path()).await;

    let mut producer = TcpStream::connect(("127.0.0.1", 39642)).await.unwrap();
    producer
        .write_all(b"{\nscoped1\nscoped2\n}\n\x04")
        .await
        .unwrap();

    let files = wait_for_files(output.path(), 1).await;
    let contents = tokio::fs::read_to_string(&files[0]).await.unwrap();
    assert_eq!(contents, "scoped1\nscoped2\n");

    cancel.cancel();
}

#[tokio::test]
async fn disconnect_flushes_open_scope() {
    let output = tempfile::tempdir().unwrap();
    let (_pipeline, cancel) = start_server(39643, 10, output.path()).await;

    let mut producer = TcpStream::connect(("127.0.0.1", 39643)).await.unwrap();
    producer.write_all(b"{\norphan\n").await.unwrap();
    drop(producer);

    let files = wait_for_files(output.path(), 1).await;
    let contents = tokio::fs::read_to_string(&files[0]).await.unwrap();
    assert_eq!(contents, "orphan\n");

    cancel.cancel();
}

#[tokio::test]
async fn two_producers_share_the_static_sequence() {
    let output = tempfile::tempdir().unwrap();
    let (pipeline, cancel) = start_server(39644, 4, output.path()).await;

    let mut a = TcpStream::connect(("127.0.0.1", 39644)).await.unwrap();
    let mut b = TcpStream::connect(("127.0.0.1", 39644)).await.unwrap();

    a.write_all(b"a1\na2\n").await.unwrap();
    a.flush().await.unwrap();
    // Let the first producer's lines land before the second writes,
    // so the block content is deterministic
    for _ in 0..100 {
        if pipeline.metrics().commands_received >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    b.write_all(b"b1\nb2\n").await.unwrap();

    let files = wait_for_files(output.path(), 1).await;
    let contents = tokio::fs::read_to_string(&files[0]).await.unwrap();
    assert_eq!(contents, "a1\na2\nb1\nb2\n");

    cancel.cancel();
}

#[tokio::test]
async fn violating_producer_is_dropped_without_killing_others() {
    let output = tempfile::tempdir().unwrap();
    let (pipeline, cancel) = start_server(39645, 2, output.path()).await;

    let mut bad = TcpStream::connect(("127.0.0.1", 39645)).await.unwrap();
    bad.write_all(b"}\n").await.unwrap();

    // The offender is dropped; a well-behaved producer still works
    for _ in 0..100 {
        if pipeline.metrics().protocol_violations >= 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let mut good = TcpStream::connect(("127.0.0.1", 39645)).await.unwrap();
    good.write_all(b"ok1\nok2\n\x04").await.unwrap();

    let files = wait_for_files(output.path(), 1).await;
    let contents = tokio::fs::read_to_string(&files[0]).await.unwrap();
    assert_eq!(contents, "ok1\nok2\n");

    cancel.cancel();
}

#[tokio::test]
async fn terminate_flushes_the_partial_static_group() {
    let output = tempfile::tempdir().unwrap();
    let (pipeline, cancel) = start_server(39646, 10, output.path()).await;

    let mut producer = TcpStream::connect(("127.0.0.1", 39646)).await.unwrap();
    producer.write_all(b"leftover1\nleftover2\n\x04").await.unwrap();

    for _ in 0..100 {
        if pipeline.metrics().commands_received >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    cancel.cancel();
    pipeline.terminate().await;

    let files = wait_for_files(output.path(), 1).await;
    let contents = tokio::fs::read_to_string(&files[0]).await.unwrap();
    assert_eq!(contents, "leftover1\nleftover2\n");
}
