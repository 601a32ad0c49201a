use serde::{Deserialize, Serialize};

use crate::error::{BlockTreeError, Result};
use crate::lexical::index::blocktree::{DEFAULT_MAX_BLOCK_SIZE, DEFAULT_MIN_BLOCK_SIZE};

/// Block size policy of the writer.
///
/// # Example
///
/// ```
/// use blocktree_ords::lexical::index::blocktree::BlockTreeConfig;
///
/// let config = BlockTreeConfig {
///     min_items_in_block: 2,
///     max_items_in_block: 4,
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockTreeConfig {
    /// Fewest entries a block is written with, except for the root.
    pub min_items_in_block: usize,
    /// Most entries a block may hold before it is split into floor blocks.
    pub max_items_in_block: usize,
}

impl Default for BlockTreeConfig {
    fn default() -> Self {
        BlockTreeConfig {
            min_items_in_block: DEFAULT_MIN_BLOCK_SIZE,
            max_items_in_block: DEFAULT_MAX_BLOCK_SIZE,
        }
    }
}

impl BlockTreeConfig {
    pub fn validate(&self) -> Result<()> {
        let min = self.min_items_in_block;
        let max = self.max_items_in_block;
        if min <= 1 {
            return Err(BlockTreeError::illegal_argument(format!(
                "minItemsInBlock must be >= 2; got {min}"
            )));
        }
        if min > max {
            return Err(BlockTreeError::illegal_argument(format!(
                "maxItemsInBlock must be >= minItemsInBlock; got maxItemsInBlock={max} minItemsInBlock={min}"
            )));
        }
        if 2 * (min - 1) > max {
            return Err(BlockTreeError::illegal_argument(format!(
                "maxItemsInBlock must be at least 2*(minItemsInBlock-1); got maxItemsInBlock={max} minItemsInBlock={min}"
            )));
        }
        Ok(())
    }
}

/// How a [`BlockTreeTermsReader`](super::BlockTreeTermsReader) opens its fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderOptions {
    /// Load the FST index. Without it only sequential iteration works.
    pub load_terms_index: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        ReaderOptions {
            load_terms_index: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = BlockTreeConfig::default();
        assert_eq!(config.min_items_in_block, 25);
        assert_eq!(config.max_items_in_block, 48);
        config.validate().unwrap();
    }

    #[test]
    fn test_validate() {
        let invalid = [(1, 10), (5, 4), (10, 17)];
        for (min, max) in invalid {
            let config = BlockTreeConfig {
                min_items_in_block: min,
                max_items_in_block: max,
            };
            assert!(config.validate().unwrap_err().is_usage_error(), "{min} {max}");
        }
        let config = BlockTreeConfig {
            min_items_in_block: 10,
            max_items_in_block: 18,
        };
        config.validate().unwrap();
    }

    #[test]
    fn test_serde_defaults() {
        let config: BlockTreeConfig = serde_json::from_str(r#"{"min_items_in_block": 4}"#).unwrap();
        assert_eq!(config.min_items_in_block, 4);
        assert_eq!(config.max_items_in_block, 48);

        let options: ReaderOptions = serde_json::from_str("{}").unwrap();
        assert!(options.load_terms_index);
    }
}
