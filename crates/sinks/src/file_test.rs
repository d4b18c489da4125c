//! File sink tests

use bulk_protocol::{Block, BlockId, SinkKind};

use crate::file::block_file_name;
use crate::{BlockSink, FileSink, FileSinkConfig};

fn test_block(id: u64, commands: &[&str]) -> Block {
    Block::new(BlockId(id), commands.iter().map(|c| c.to_string()).collect())
}

#[test]
fn test_file_name_is_deterministic() {
    let block = test_block(42, &["a"]);
    let name = block_file_name(&block);

    assert_eq!(name, block_file_name(&block));
    assert!(name.starts_with("bulk"));
    assert!(name.ends_with("_42.log"));
}

#[test]
fn test_file_names_never_collide_within_a_millisecond() {
    let a = test_block(1, &["a"]);
    let b = test_block(2, &["b"]);
    assert_ne!(block_file_name(&a), block_file_name(&b));
}

#[tokio::test]
async fn test_emit_writes_commands_one_per_line() {
    let dir = tempfile::tempdir().unwrap();
    let mut sink = FileSink::new(FileSinkConfig::with_directory(dir.path()));
    assert_eq!(sink.kind(), SinkKind::File);

    let block = test_block(7, &["cmd1", "cmd2", "cmd3"]);
    sink.emit(&block).await.unwrap();

    let path = dir.path().join(block_file_name(&block));
    let contents = tokio::fs::read_to_string(&path).await.unwrap();
    assert_eq!(contents, "cmd1\ncmd2\ncmd3\n");

    let snapshot = sink.metrics_snapshot();
    assert_eq!(snapshot.blocks_written, 1);
    assert_eq!(snapshot.commands_written, 3);
    assert_eq!(snapshot.bytes_written, contents.len() as u64);
    assert_eq!(snapshot.write_errors, 0);
}

#[tokio::test]
async fn test_emit_creates_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("a").join("b");
    let mut sink = FileSink::new(FileSinkConfig::with_directory(&nested));

    sink.emit(&test_block(1, &["x"])).await.unwrap();

    assert!(nested.is_dir());
    assert_eq!(std::fs::read_dir(&nested).unwrap().count(), 1);
}

#[tokio::test]
async fn test_each_block_gets_its_own_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut sink = FileSink::new(FileSinkConfig::with_directory(dir.path()));

    sink.emit(&test_block(1, &["a"])).await.unwrap();
    sink.emit(&test_block(2, &["b", "c"])).await.unwrap();

    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    assert_eq!(sink.metrics_snapshot().blocks_written, 2);
}
