//! Server configuration

use packet_arena::{Arena, HeapPageAllocator, DEFAULT_PAGE_SIZE};
use serde::{Deserialize, Serialize};

/// Per-session server settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Arena page size in bytes
    pub page_size: usize,
    /// Cap on total arena bytes; `None` means unbounded
    pub arena_limit: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            arena_limit: None,
        }
    }
}

impl ServerConfig {
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_arena_limit(mut self, limit: usize) -> Self {
        self.arena_limit = Some(limit);
        self
    }

    /// Builds the arena a session runs on
    pub fn build_arena(&self) -> Arena {
        let allocator = HeapPageAllocator::new(self.page_size);
        let allocator = match self.arena_limit {
            Some(limit) => allocator.with_limit(limit),
            None => allocator,
        };
        Arena::new(allocator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.page_size, 2048);
        assert_eq!(config.arena_limit, None);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ServerConfig = serde_json::from_str(r#"{"arena_limit": 4096}"#).unwrap();
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.arena_limit, Some(4096));
    }

    #[test]
    fn test_limited_arena() {
        let arena = ServerConfig::default()
            .with_page_size(64)
            .with_arena_limit(64)
            .build_arena();
        assert!(arena.alloc_slice::<u8>(64).is_ok());
        assert!(arena.alloc_slice::<u8>(1).is_err());
    }
}
