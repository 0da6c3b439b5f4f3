//! Persisted lamp registry
//!
//! The registry maps slot indices `0..max_lamps` to lamp records created by
//! external provisioning tooling. Each slot is a JSON blob stored under
//! `lamp/{index}`. From the bridge's perspective the registry is read-only;
//! the admin CLI is the only writer.
//!
//! Lookups compare resolved numeric addresses, not the stored text, because
//! inbound mesh events carry numeric addresses. A storage read error or an
//! undeserializable slot is treated as "slot absent" - the scan continues.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use lumen_state::Storage;

use crate::config::MAX_LAMPS;
use crate::error::{BridgeError, Result};

/// One lamp registry record
///
/// The mesh address is stored textually (decimal or `0x`-prefixed hex) the
/// way provisioning tooling wrote it, and resolved on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LampInfo {
    /// Lamp name, used as the `<name>` segment of MQTT topics
    pub name: String,
    /// Mesh node address as text
    pub address: String,
}

impl LampInfo {
    /// Create a record from name and address text
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }

    /// Resolve the stored address text to a numeric mesh address
    pub fn resolved_address(&self) -> Result<u16> {
        parse_mesh_address(&self.address).ok_or_else(|| BridgeError::AddressParse {
            name: self.name.clone(),
            raw: self.address.clone(),
        })
    }
}

/// Parse a mesh address from text, accepting decimal and `0x` hex forms
pub fn parse_mesh_address(raw: &str) -> Option<u16> {
    let s = raw.trim();
    let (digits, radix) = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => (hex, 16),
        None => (s, 10),
    };
    u16::from_str_radix(digits, radix).ok()
}

/// Persisted slot-indexed lamp registry
#[derive(Clone)]
pub struct LampRegistry {
    storage: Arc<dyn Storage>,
    max_lamps: usize,
}

impl LampRegistry {
    /// Create a registry over the given storage with the default slot count
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self::with_capacity(storage, MAX_LAMPS)
    }

    /// Create a registry with an explicit slot count
    pub fn with_capacity(storage: Arc<dyn Storage>, max_lamps: usize) -> Self {
        Self { storage, max_lamps }
    }

    fn slot_key(index: usize) -> String {
        format!("lamp/{index}")
    }

    /// Number of registry slots scanned by the iteration operations
    pub fn capacity(&self) -> usize {
        self.max_lamps
    }

    /// Look up the lamp at `index`, returning `None` for absent or
    /// unreadable slots
    pub async fn lookup_by_index(&self, index: usize) -> Option<LampInfo> {
        if index >= self.max_lamps {
            return None;
        }
        let bytes = match self.storage.get(&Self::slot_key(index)).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                // A failed slot read is "absent", not fatal
                warn!(index, error = %e, "Registry slot read failed, skipping");
                return None;
            }
        };
        match serde_json::from_slice::<LampInfo>(&bytes) {
            Ok(lamp) => Some(lamp),
            Err(e) => {
                warn!(index, error = %e, "Registry slot undeserializable, skipping");
                None
            }
        }
    }

    /// Reverse lookup by numeric mesh address
    ///
    /// Scans slots from 0 and returns the first entry whose resolved
    /// address equals `addr`. Entries with unparseable addresses are
    /// skipped.
    pub async fn lookup_by_address(&self, addr: u16) -> Option<(usize, LampInfo)> {
        for index in 0..self.max_lamps {
            if let Some(lamp) = self.lookup_by_index(index).await {
                match lamp.resolved_address() {
                    Ok(resolved) if resolved == addr => return Some((index, lamp)),
                    Ok(_) => {}
                    Err(e) => debug!(index, error = %e, "Skipping entry in address lookup"),
                }
            }
        }
        None
    }

    /// Count valid entries scanning from slot 0 until the first absent slot
    pub async fn count(&self) -> usize {
        let mut count = 0;
        for index in 0..self.max_lamps {
            if self.lookup_by_index(index).await.is_none() {
                break;
            }
            count += 1;
        }
        count
    }

    /// All populated slots in index order, holes skipped
    pub async fn entries(&self) -> Vec<(usize, LampInfo)> {
        let mut entries = Vec::new();
        for index in 0..self.max_lamps {
            if let Some(lamp) = self.lookup_by_index(index).await {
                entries.push((index, lamp));
            }
        }
        entries
    }

    /// Write a lamp record into `index` (admin tooling path)
    pub async fn put(&self, index: usize, lamp: &LampInfo) -> Result<()> {
        if index >= self.max_lamps {
            return Err(BridgeError::SlotNotFound(index));
        }
        let bytes = serde_json::to_vec(lamp)?;
        self.storage.put(&Self::slot_key(index), &bytes).await?;
        Ok(())
    }

    /// Remove the lamp record at `index` (admin tooling path)
    pub async fn remove(&self, index: usize) -> Result<()> {
        if index >= self.max_lamps {
            return Err(BridgeError::SlotNotFound(index));
        }
        self.storage.delete(&Self::slot_key(index)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_state::MemoryStore;

    fn registry() -> LampRegistry {
        LampRegistry::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_parse_mesh_address() {
        assert_eq!(parse_mesh_address("20"), Some(20));
        assert_eq!(parse_mesh_address("0x14"), Some(0x14));
        assert_eq!(parse_mesh_address("0X14"), Some(0x14));
        assert_eq!(parse_mesh_address(" 7 "), Some(7));
        assert_eq!(parse_mesh_address("lamp"), None);
        assert_eq!(parse_mesh_address("-5"), None);
        assert_eq!(parse_mesh_address(""), None);
        assert_eq!(parse_mesh_address("99999"), None); // exceeds u16
    }

    #[test]
    fn test_resolved_address_error_carries_context() {
        let lamp = LampInfo::new("kitchen", "not-a-number");
        let err = lamp.resolved_address().unwrap_err();
        assert_eq!(err.error_code(), "ADDRESS_PARSE");
        assert!(err.to_string().contains("kitchen"));
    }

    #[tokio::test]
    async fn test_lookup_by_index() {
        let reg = registry();
        reg.put(0, &LampInfo::new("kitchen", "20")).await.unwrap();

        let lamp = reg.lookup_by_index(0).await.unwrap();
        assert_eq!(lamp.name, "kitchen");
        assert!(reg.lookup_by_index(1).await.is_none());
        assert!(reg.lookup_by_index(999).await.is_none());
    }

    #[tokio::test]
    async fn test_lookup_by_address_first_match() {
        let reg = registry();
        reg.put(0, &LampInfo::new("kitchen", "20")).await.unwrap();
        reg.put(1, &LampInfo::new("office", "0x15")).await.unwrap();
        reg.put(2, &LampInfo::new("kitchen-clone", "20")).await.unwrap();

        let (index, lamp) = reg.lookup_by_address(20).await.unwrap();
        assert_eq!(index, 0);
        assert_eq!(lamp.name, "kitchen");

        let (index, _) = reg.lookup_by_address(0x15).await.unwrap();
        assert_eq!(index, 1);

        assert!(reg.lookup_by_address(0x99).await.is_none());
    }

    #[tokio::test]
    async fn test_lookup_by_address_skips_unparseable() {
        let reg = registry();
        reg.put(0, &LampInfo::new("broken", "n/a")).await.unwrap();
        reg.put(1, &LampInfo::new("good", "33")).await.unwrap();

        let (index, _) = reg.lookup_by_address(33).await.unwrap();
        assert_eq!(index, 1);
    }

    #[tokio::test]
    async fn test_count_stops_at_first_hole() {
        let reg = registry();
        reg.put(0, &LampInfo::new("a", "1")).await.unwrap();
        reg.put(1, &LampInfo::new("b", "2")).await.unwrap();
        reg.put(5, &LampInfo::new("f", "6")).await.unwrap();

        assert_eq!(reg.count().await, 2);
    }

    #[tokio::test]
    async fn test_sparse_scan_finds_all_entries() {
        // Entries only at 0 and 5; the full scan must find both and skip
        // 1-4 and 6-19 without error.
        let reg = registry();
        reg.put(0, &LampInfo::new("a", "1")).await.unwrap();
        reg.put(5, &LampInfo::new("f", "6")).await.unwrap();

        let entries = reg.entries().await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, 0);
        assert_eq!(entries[1].0, 5);
    }

    #[tokio::test]
    async fn test_corrupt_slot_treated_as_absent() {
        let store = Arc::new(MemoryStore::new());
        store.put("lamp/0", b"not json").await.unwrap();
        let reg = LampRegistry::new(store);

        assert!(reg.lookup_by_index(0).await.is_none());
        assert_eq!(reg.entries().await.len(), 0);
    }

    #[tokio::test]
    async fn test_put_out_of_range_slot() {
        let reg = registry();
        let err = reg.put(MAX_LAMPS, &LampInfo::new("x", "1")).await.unwrap_err();
        assert!(matches!(err, BridgeError::SlotNotFound(_)));
    }
}
