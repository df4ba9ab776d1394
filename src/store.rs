//! Embedded wardrobe store
//!
//! `sled`-backed persistence for scanned garments and composed outfits.
//! Records are `bincode`-encoded under their id's 16-byte form; reads
//! return newest-first. Every write is flushed before the call resolves,
//! so a completed `put` survives an immediate process kill.

use crate::error::{ClosetError, Result};
use crate::records::{GarmentRecord, OutfitRecord};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Environment variable overriding the wardrobe data directory
pub const DATA_DIR_ENV: &str = "CLOSETKIT_DATA_DIR";

const GARMENTS_TREE: &str = "garments";
const OUTFITS_TREE: &str = "outfits";
const META_TREE: &str = "meta";
const SCHEMA_VERSION_KEY: &[u8] = b"schema_version";

/// Current on-disk schema version
///
/// Version 1 stored garments only; version 2 added the outfits collection.
/// Migration is purely additive, existing records are never rewritten.
pub const SCHEMA_VERSION: u32 = 2;

/// Embedded store holding the scanned wardrobe
///
/// Cheap to clone handles internally (`sled` trees are `Arc`-backed);
/// callers share one store per data directory. Deleting a garment does not
/// cascade into outfits, readers skip dangling references instead.
pub struct WardrobeStore {
    db: sled::Db,
    meta: sled::Tree,
    garments: sled::Tree,
    outfits: sled::Tree,
}

impl WardrobeStore {
    /// Open (or create) a store at `path`, migrating older schemas in place
    ///
    /// # Errors
    /// - The directory cannot be opened or locked by `sled`
    /// - The recorded schema version is newer than this build supports
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = sled::open(path.as_ref())?;
        let meta = db.open_tree(META_TREE)?;
        let garments = db.open_tree(GARMENTS_TREE)?;

        // Stores written before the version key existed are version 1
        let stored_version = match meta.get(SCHEMA_VERSION_KEY)? {
            Some(raw) => decode_version(&raw)?,
            None => 1,
        };

        if stored_version > SCHEMA_VERSION {
            return Err(ClosetError::storage(format!(
                "Store schema version {stored_version} is newer than supported version {SCHEMA_VERSION}"
            )));
        }
        if stored_version < SCHEMA_VERSION {
            log::info!(
                "Migrating wardrobe store schema v{stored_version} -> v{SCHEMA_VERSION} at {}",
                path.as_ref().display()
            );
        }

        // Opening the tree creates it, which is the whole v1 -> v2 migration
        let outfits = db.open_tree(OUTFITS_TREE)?;
        meta.insert(SCHEMA_VERSION_KEY, &SCHEMA_VERSION.to_be_bytes())?;

        log::debug!("Wardrobe store open at {}", path.as_ref().display());
        Ok(Self {
            db,
            meta,
            garments,
            outfits,
        })
    }

    /// Open the store at the default platform location
    ///
    /// `CLOSETKIT_DATA_DIR` overrides the default of
    /// `dirs::data_dir()/closetkit/wardrobe`.
    ///
    /// # Errors
    /// - No platform data directory can be determined
    /// - See [`WardrobeStore::open`]
    pub fn open_default() -> Result<Self> {
        Self::open(default_data_dir()?)
    }

    /// Schema version recorded on disk
    ///
    /// # Errors
    /// - Version record is missing or malformed
    pub fn schema_version(&self) -> Result<u32> {
        match self.meta.get(SCHEMA_VERSION_KEY)? {
            Some(raw) => decode_version(&raw),
            None => Err(ClosetError::storage("Schema version record is missing")),
        }
    }

    /// Insert or replace a garment
    ///
    /// # Errors
    /// - Encoding or tree insertion failures
    pub async fn put_garment(&self, record: &GarmentRecord) -> Result<()> {
        let value = bincode::serialize(record)
            .map_err(|e| ClosetError::storage_op_error("encode record", GARMENTS_TREE, &e))?;
        self.garments
            .insert(record.id.as_bytes(), value)
            .map_err(|e| ClosetError::storage_op_error("insert record", GARMENTS_TREE, &e))?;
        self.db.flush_async().await?;
        Ok(())
    }

    /// Fetch one garment by id
    ///
    /// # Errors
    /// - Tree read failures or a value that no longer decodes
    pub async fn get_garment(&self, id: Uuid) -> Result<Option<GarmentRecord>> {
        let tree = self.garments.clone();
        tokio::task::spawn_blocking(move || match tree.get(id.as_bytes())? {
            Some(raw) => Ok(Some(decode_garment(&raw)?)),
            None => Ok(None),
        })
        .await
        .map_err(|e| ClosetError::storage(format!("Store read task failed: {e}")))?
    }

    /// All garments, newest first
    ///
    /// # Errors
    /// - Tree iteration failures or a value that no longer decodes
    pub async fn garments(&self) -> Result<Vec<GarmentRecord>> {
        let tree = self.garments.clone();
        tokio::task::spawn_blocking(move || {
            let mut records = Vec::new();
            for entry in tree.iter() {
                let (_, raw) = entry?;
                records.push(decode_garment(&raw)?);
            }
            records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(records)
        })
        .await
        .map_err(|e| ClosetError::storage(format!("Store read task failed: {e}")))?
    }

    /// Delete one garment, reporting whether it existed
    ///
    /// Outfits referencing the garment keep their now-dangling id; reads
    /// filter those out.
    ///
    /// # Errors
    /// - Tree removal failures
    pub async fn delete_garment(&self, id: Uuid) -> Result<bool> {
        let removed = self
            .garments
            .remove(id.as_bytes())
            .map_err(|e| ClosetError::storage_op_error("remove record", GARMENTS_TREE, &e))?
            .is_some();
        self.db.flush_async().await?;
        Ok(removed)
    }

    /// Insert or replace an outfit
    ///
    /// # Errors
    /// - Encoding or tree insertion failures
    pub async fn put_outfit(&self, record: &OutfitRecord) -> Result<()> {
        let value = bincode::serialize(record)
            .map_err(|e| ClosetError::storage_op_error("encode record", OUTFITS_TREE, &e))?;
        self.outfits
            .insert(record.id.as_bytes(), value)
            .map_err(|e| ClosetError::storage_op_error("insert record", OUTFITS_TREE, &e))?;
        self.db.flush_async().await?;
        Ok(())
    }

    /// Fetch one outfit by id
    ///
    /// # Errors
    /// - Tree read failures or a value that no longer decodes
    pub async fn get_outfit(&self, id: Uuid) -> Result<Option<OutfitRecord>> {
        let tree = self.outfits.clone();
        tokio::task::spawn_blocking(move || match tree.get(id.as_bytes())? {
            Some(raw) => Ok(Some(decode_outfit(&raw)?)),
            None => Ok(None),
        })
        .await
        .map_err(|e| ClosetError::storage(format!("Store read task failed: {e}")))?
    }

    /// All outfits, newest first
    ///
    /// # Errors
    /// - Tree iteration failures or a value that no longer decodes
    pub async fn outfits(&self) -> Result<Vec<OutfitRecord>> {
        let tree = self.outfits.clone();
        tokio::task::spawn_blocking(move || {
            let mut records = Vec::new();
            for entry in tree.iter() {
                let (_, raw) = entry?;
                records.push(decode_outfit(&raw)?);
            }
            records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(records)
        })
        .await
        .map_err(|e| ClosetError::storage(format!("Store read task failed: {e}")))?
    }

    /// Delete one outfit, reporting whether it existed
    ///
    /// # Errors
    /// - Tree removal failures
    pub async fn delete_outfit(&self, id: Uuid) -> Result<bool> {
        let removed = self
            .outfits
            .remove(id.as_bytes())
            .map_err(|e| ClosetError::storage_op_error("remove record", OUTFITS_TREE, &e))?
            .is_some();
        self.db.flush_async().await?;
        Ok(removed)
    }

    /// Garments referenced by `outfit`, skipping ids that no longer exist
    ///
    /// # Errors
    /// - Tree read failures or a value that no longer decodes
    pub async fn resolve_garments(&self, outfit: &OutfitRecord) -> Result<Vec<GarmentRecord>> {
        let tree = self.garments.clone();
        let ids = outfit.garment_ids.clone();
        tokio::task::spawn_blocking(move || {
            let mut records = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(raw) = tree.get(id.as_bytes())? {
                    records.push(decode_garment(&raw)?);
                } else {
                    log::debug!("Skipping dangling garment reference {id}");
                }
            }
            Ok(records)
        })
        .await
        .map_err(|e| ClosetError::storage(format!("Store read task failed: {e}")))?
    }
}

impl std::fmt::Debug for WardrobeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WardrobeStore")
            .field("garments", &self.garments.len())
            .field("outfits", &self.outfits.len())
            .finish_non_exhaustive()
    }
}

/// Resolve the wardrobe data directory
///
/// # Errors
/// - No platform data directory can be determined and no override is set
pub fn default_data_dir() -> Result<PathBuf> {
    if let Ok(custom) = std::env::var(DATA_DIR_ENV) {
        if !custom.trim().is_empty() {
            return Ok(PathBuf::from(custom));
        }
    }
    dirs::data_dir()
        .map(|base| base.join("closetkit").join("wardrobe"))
        .ok_or_else(|| ClosetError::storage("Could not determine platform data directory"))
}

fn decode_version(raw: &[u8]) -> Result<u32> {
    let bytes: [u8; 4] = raw
        .try_into()
        .map_err(|_| ClosetError::storage("Schema version record is malformed"))?;
    Ok(u32::from_be_bytes(bytes))
}

fn decode_garment(raw: &[u8]) -> Result<GarmentRecord> {
    bincode::deserialize(raw)
        .map_err(|e| ClosetError::storage_op_error("decode record", GARMENTS_TREE, &e))
}

fn decode_outfit(raw: &[u8]) -> Result<OutfitRecord> {
    bincode::deserialize(raw)
        .map_err(|e| ClosetError::storage_op_error("decode record", OUTFITS_TREE, &e))
}
