use crate::infrastructure::config::types::{default_remote_key_id, AppConfig, KeyConfig};
use std::collections::HashSet;

impl AppConfig {
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.signer.host.trim().is_empty() {
            errors.push("signer.host must not be empty".to_string());
        }
        if self.signer.port == 0 {
            errors.push("signer.port must be > 0".to_string());
        }
        if self.signer.max_attempts == 0 {
            errors.push("signer.max_attempts must be > 0".to_string());
        }
        if self.signer.pool_size == 0 {
            errors.push("signer.pool_size must be > 0".to_string());
        }
        if self.signer.socket_timeout_ms == 0 {
            errors.push("signer.socket_timeout_ms must be > 0".to_string());
        }

        let bk = &self.bookkeeping;
        if bk.difficulty_target == 0 {
            errors.push("bookkeeping.difficulty_target must be > 0".to_string());
        }
        if bk.difficulty_cap == 0 {
            errors.push("bookkeeping.difficulty_cap must be > 0".to_string());
        }
        if bk.max_confirmed_blocks == 0 {
            errors.push("bookkeeping.max_confirmed_blocks must be > 0".to_string());
        }
        // Update-ancestor chunks overlap by one header, so a chunk must carry at least two.
        if bk.max_chunk_size < 2 {
            errors.push("bookkeeping.max_chunk_size must be >= 2".to_string());
        }
        if !bk.disabled && bk.informer_interval_ms == 0 {
            errors.push("bookkeeping.informer_interval_ms must be > 0".to_string());
        }

        let mut seen = HashSet::new();
        for key in &self.keys {
            let key_id = key.key_id();
            if key_id.trim().is_empty() {
                errors.push("keys entry with empty key_id".to_string());
                continue;
            }
            if !seen.insert(key_id.clone()) {
                errors.push(format!("duplicate key_id in keys: {}", key_id));
            }
            match key {
                KeyConfig::Remote { remote_key_id: None, .. } if default_remote_key_id(self.network, key_id).is_none() => {
                    errors.push(format!("keys.{}: remote_key_id is required for custom key ids", key_id));
                }
                KeyConfig::KeyFile { path, .. } if path.trim().is_empty() => {
                    errors.push(format!("keys.{}: path must not be empty", key_id));
                }
                _ => {}
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
