//! Block - Immutable ordered batch of commands
//!
//! A `Block` is created exactly once at a flush point (size threshold,
//! scope close, disconnect, or terminate) and never mutated afterwards.
//! Sinks share it through `Arc<Block>`; the mutable delivery state lives
//! in the delivery queue entry, not here.

use chrono::{DateTime, Utc};

/// Identifier of a block, unique for the lifetime of the process.
///
/// Allocated from a monotonic counter by the delivery queue; also used
/// to disambiguate file names for blocks created in the same
/// millisecond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u64);

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable ordered batch of commands plus its creation timestamp.
#[derive(Debug, Clone)]
pub struct Block {
    id: BlockId,
    created_at: DateTime<Utc>,
    commands: Vec<String>,
}

impl Block {
    /// Create a block with a fresh timestamp.
    ///
    /// Command order is preserved exactly as handed in.
    pub fn new(id: BlockId, commands: Vec<String>) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            commands,
        }
    }

    /// Block identifier.
    #[inline]
    pub fn id(&self) -> BlockId {
        self.id
    }

    /// Creation timestamp.
    #[inline]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Creation timestamp as milliseconds since the Unix epoch.
    #[inline]
    pub fn created_at_millis(&self) -> i64 {
        self.created_at.timestamp_millis()
    }

    /// The commands, in arrival order.
    #[inline]
    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    /// Number of commands in the block.
    #[inline]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// True when the block carries no commands.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_preserves_order() {
        let block = Block::new(
            BlockId(7),
            vec!["a".into(), "b".into(), "c".into()],
        );
        assert_eq!(block.id(), BlockId(7));
        assert_eq!(block.len(), 3);
        assert_eq!(block.commands(), ["a", "b", "c"]);
    }

    #[test]
    fn test_timestamp_is_recent() {
        let before = Utc::now().timestamp_millis();
        let block = Block::new(BlockId(0), vec!["x".into()]);
        let after = Utc::now().timestamp_millis();
        assert!(block.created_at_millis() >= before);
        assert!(block.created_at_millis() <= after);
    }
}
