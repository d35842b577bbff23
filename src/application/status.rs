//! Persistence of the per-target status map.

use crate::domain::{AppError, Result, StatusMap};
use crate::infrastructure::{StateStore, STATUS_KEY};

/// Load the persisted status map; absent or unreadable state starts empty.
///
/// # Errors
/// Returns error if the state store fails.
pub fn load_statuses(store: &impl StateStore) -> Result<StatusMap> {
    let Some(raw) = store.get(STATUS_KEY)? else {
        return Ok(StatusMap::new());
    };

    match serde_json::from_str(&raw) {
        Ok(map) => Ok(map),
        Err(e) => {
            tracing::warn!("Discarding unreadable status map: {}", e);
            Ok(StatusMap::new())
        }
    }
}

/// Overwrite the persisted status map.
///
/// # Errors
/// Returns error if serialization or the state store fails.
pub fn save_statuses(store: &impl StateStore, statuses: &StatusMap) -> Result<()> {
    let raw = serde_json::to_string(statuses).map_err(AppError::json_parse)?;
    store.put(STATUS_KEY, &raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ExtensionStatus;
    use crate::infrastructure::state_store::MemoryStateStore;

    #[test]
    fn test_missing_state_is_empty() {
        let store = MemoryStateStore::new();
        assert!(load_statuses(&store).unwrap().is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let store = MemoryStateStore::new();
        let mut map = StatusMap::new();
        map.transition("A", ExtensionStatus::Injected);

        save_statuses(&store, &map).unwrap();
        assert_eq!(load_statuses(&store).unwrap(), map);
    }

    #[test]
    fn test_reads_state_written_by_editor_extension() {
        let store = MemoryStateStore::new();
        store
            .put(STATUS_KEY, r#"{"a.ext":"injected","b.ext":"not modified"}"#)
            .unwrap();

        let map = load_statuses(&store).unwrap();
        assert_eq!(map.get("a.ext"), Some(ExtensionStatus::Injected));
        assert_eq!(map.get("b.ext"), Some(ExtensionStatus::NotModified));
    }

    #[test]
    fn test_corrupt_state_starts_empty() {
        let store = MemoryStateStore::new();
        store.put(STATUS_KEY, "{not json").unwrap();
        assert!(load_statuses(&store).unwrap().is_empty());
    }
}
