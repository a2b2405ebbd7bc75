//! Tunable constants. This crate has no CLI/env surface of its own, but the
//! embedder may seed these through the `config` crate the way
//! `autograph-render`'s examples do for their own settings.

use crate::staging::{DEFAULT_UPLOAD_CHUNK_SIZE, IMMEDIATE_CONSTANT_CHUNK_SIZE};

#[derive(Copy, Clone, Debug)]
pub struct ContextConfig {
    pub upload_ring_chunk_size: u64,
    pub immediate_constant_chunk_size: u64,
    pub default_descriptor_array_capacity: u32,
    /// Batches withheld from `_cleanup` even once their semaphores have
    /// passed, so in-flight CPU-side readback has a grace window.
    pub keep_batches: usize,
}

impl Default for ContextConfig {
    fn default() -> ContextConfig {
        ContextConfig {
            upload_ring_chunk_size: DEFAULT_UPLOAD_CHUNK_SIZE,
            immediate_constant_chunk_size: IMMEDIATE_CONSTANT_CHUNK_SIZE,
            default_descriptor_array_capacity: 4096,
            keep_batches: 0,
        }
    }
}

impl ContextConfig {
    /// Loads overrides from a `config::Config` source; any key this crate
    /// doesn't recognize is ignored, any key it does recognize but that
    /// fails to parse falls back to the built-in default instead of
    /// failing the whole load.
    pub fn from_source(source: &config::Config) -> ContextConfig {
        let mut cfg = ContextConfig::default();
        if let Ok(v) = source.get_int("upload_ring_chunk_size") {
            cfg.upload_ring_chunk_size = v as u64;
        }
        if let Ok(v) = source.get_int("immediate_constant_chunk_size") {
            cfg.immediate_constant_chunk_size = v as u64;
        }
        if let Ok(v) = source.get_int("default_descriptor_array_capacity") {
            cfg.default_descriptor_array_capacity = v as u32;
        }
        if let Ok(v) = source.get_int("keep_batches") {
            cfg.keep_batches = v as usize;
        }
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_original_constants() {
        let cfg = ContextConfig::default();
        assert_eq!(cfg.upload_ring_chunk_size, 4 * 1024 * 1024);
        assert_eq!(cfg.immediate_constant_chunk_size, 1024 * 1024);
    }
}
