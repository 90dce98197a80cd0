//! Best-effort persistence of the world economy.
//!
//! The world is authoritative in memory. Stores only see whole snapshots:
//! one load at startup, a save after each economy advancement and a final
//! save at shutdown. A failed save is logged by the caller and retried at
//! the next opportunity.

use bincode::{deserialize, serialize};
use log::{debug, info};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::world::WorldSnapshot;

#[allow(async_fn_in_trait)]
pub trait WorldStore {
    /// `Ok(None)` means the store has never been written.
    async fn load(&mut self) -> Result<Option<WorldSnapshot>, StoreError>;

    async fn save(&mut self, snapshot: &WorldSnapshot) -> Result<(), StoreError>;

    async fn close(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Keeps the last snapshot in memory. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    snapshot: Option<WorldSnapshot>,
    saves: usize,
    closed: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(snapshot: WorldSnapshot) -> Self {
        Self {
            snapshot: Some(snapshot),
            ..Self::default()
        }
    }

    pub fn snapshot(&self) -> Option<&WorldSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn saves(&self) -> usize {
        self.saves
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl WorldStore for MemoryStore {
    async fn load(&mut self) -> Result<Option<WorldSnapshot>, StoreError> {
        Ok(self.snapshot.clone())
    }

    async fn save(&mut self, snapshot: &WorldSnapshot) -> Result<(), StoreError> {
        self.snapshot = Some(snapshot.clone());
        self.saves += 1;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        self.closed = true;
        Ok(())
    }
}

/// bincode snapshot in a single file, replaced atomically on save.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl WorldStore for FileStore {
    async fn load(&mut self) -> Result<Option<WorldSnapshot>, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                let snapshot: WorldSnapshot = deserialize(&bytes)?;
                info!(
                    "Loaded {} organisms and {} food items from {}",
                    snapshot.organisms.len(),
                    snapshot.food.len(),
                    self.path.display()
                );
                Ok(Some(snapshot))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No state at {}, starting fresh", self.path.display());
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&mut self, snapshot: &WorldSnapshot) -> Result<(), StoreError> {
        let data = serialize(snapshot)?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, &data).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        debug!("Saved {} bytes to {}", data.len(), self.path.display());
        Ok(())
    }
}

/// Store selected from configuration.
#[derive(Debug)]
pub enum ConfiguredStore {
    Memory(MemoryStore),
    File(FileStore),
}

impl ConfiguredStore {
    pub fn from_path(path: Option<PathBuf>) -> Self {
        match path {
            Some(path) => ConfiguredStore::File(FileStore::new(path)),
            None => ConfiguredStore::Memory(MemoryStore::new()),
        }
    }
}

impl WorldStore for ConfiguredStore {
    async fn load(&mut self) -> Result<Option<WorldSnapshot>, StoreError> {
        match self {
            ConfiguredStore::Memory(store) => store.load().await,
            ConfiguredStore::File(store) => store.load().await,
        }
    }

    async fn save(&mut self, snapshot: &WorldSnapshot) -> Result<(), StoreError> {
        match self {
            ConfiguredStore::Memory(store) => store.save(snapshot).await,
            ConfiguredStore::File(store) => store.save(snapshot).await,
        }
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        match self {
            ConfiguredStore::Memory(store) => store.close().await,
            ConfiguredStore::File(store) => store.close().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{Activity, Food, FoodId, Organism, OrganismId};
    use rust_decimal::Decimal;

    fn sample() -> WorldSnapshot {
        WorldSnapshot {
            organisms: vec![Organism::new(
                OrganismId(1),
                Decimal::new(15, 1),
                Decimal::from(120),
                Activity::Dancing,
            )],
            food: vec![Food {
                id: FoodId(2),
                mass: Decimal::new(75, 2),
                predator: Some(OrganismId(1)),
            }],
        }
    }

    fn temp_file(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("fishtank-{}-{}.bin", name, std::process::id()))
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let mut store = MemoryStore::new();
        assert!(store.load().await.unwrap().is_none());

        store.save(&sample()).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(sample()));
        assert_eq!(store.saves(), 1);

        store.close().await.unwrap();
        assert!(store.is_closed());
    }

    #[test]
    fn test_memory_store_starts_from_snapshot() {
        let mut store = MemoryStore::with_snapshot(sample());
        let loaded = tokio_test::block_on(store.load()).unwrap();
        assert_eq!(loaded, Some(sample()));
        assert_eq!(store.saves(), 0);
    }

    #[tokio::test]
    async fn test_file_store_missing_file_is_empty() {
        let mut store = FileStore::new(temp_file("missing"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_persists_snapshot() {
        let path = temp_file("persist");
        let mut store = FileStore::new(&path);
        store.save(&sample()).await.unwrap();

        let mut reopened = FileStore::new(&path);
        let loaded = reopened.load().await.unwrap().unwrap();
        assert_eq!(loaded, sample());
        assert_eq!(loaded.organisms[0].stored_saturation(), Decimal::from(120));
        assert_eq!(loaded.food[0].mass.to_string(), "0.75");
        assert!(!store.temp_path().exists());

        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_file_store_rejects_garbage() {
        let path = temp_file("garbage");
        std::fs::write(&path, [0xff, 0xff, 0xff]).unwrap();

        let mut store = FileStore::new(&path);
        assert!(matches!(store.load().await, Err(StoreError::Codec(_))));

        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_configured_store_selection() {
        assert!(matches!(ConfiguredStore::from_path(None), ConfiguredStore::Memory(_)));
        let mut store = ConfiguredStore::from_path(Some(temp_file("configured")));
        assert!(matches!(store, ConfiguredStore::File(_)));
        assert!(store.load().await.unwrap().is_none());
    }
}
