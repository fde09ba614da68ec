use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::Result;

use super::{decode, encode, Collectable, Identifiable};

#[derive(Clone, Debug)]
pub struct SledDb {
    inner: sled::Db,
}

impl SledDb {
    /// Opens the store as described by the db config.
    pub fn new(config: &crate::config::Db) -> Result<Self> {
        let inner = sled::Config::default()
            .path(&config.path)
            .temporary(config.temporary)
            .open()?;
        Ok(Self { inner })
    }

    /// Throwaway store, removed from disk when dropped.
    pub fn temporary() -> Result<Self> {
        let inner = sled::Config::default().temporary(true).open()?;
        Ok(Self { inner })
    }

    pub fn get_collection<T: DeserializeOwned + Collectable>(&self) -> Result<Vec<T>> {
        self.get_collection_at(T::get_collection_name())
    }

    /// Gets a collection of entries of the same type from the collection
    /// specified by name.
    pub fn get_collection_at<T: DeserializeOwned>(&self, name: impl AsRef<[u8]>) -> Result<Vec<T>> {
        let tree = self.inner.open_tree(name)?;
        let mut out = Vec::new();
        for entry in tree.iter() {
            let (_, value_bytes) = entry?;
            out.push(decode(&value_bytes)?);
        }
        Ok(out)
    }

    /// Gets an item by id from the collection specified by name, `None` if
    /// there is no such item.
    pub fn try_get_at<T: DeserializeOwned>(&self, collection: &str, id: Uuid) -> Result<Option<T>> {
        let tree = self.inner.open_tree(collection)?;
        match tree.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn set<T: Serialize + Identifiable + Collectable>(&self, value: &T) -> Result<()> {
        self.set_at(T::get_collection_name(), value)
    }

    pub fn set_at<T: Serialize + Identifiable>(
        &self,
        collection: impl AsRef<[u8]>,
        value: &T,
    ) -> Result<()> {
        self.set_raw_at(collection, value, value.get_id())
    }

    /// Stores the value under `id`, overwriting whatever was there.
    pub fn set_raw_at<T: Serialize>(
        &self,
        collection: impl AsRef<[u8]>,
        value: &T,
        id: Uuid,
    ) -> Result<()> {
        let tree = self.inner.open_tree(collection)?;
        let encoded = encode(value)?;
        tree.insert(id.as_bytes(), encoded)?;
        Ok(())
    }

    pub fn remove<T: Identifiable + Collectable>(&self, value: &T) -> Result<()> {
        self.remove_at(T::get_collection_name(), value.get_id())
    }

    pub fn remove_at(&self, collection: impl AsRef<[u8]>, id: Uuid) -> Result<()> {
        let tree = self.inner.open_tree(collection)?;
        tree.remove(id.as_bytes())?;
        Ok(())
    }

    pub async fn flush(&self) -> Result<()> {
        self.inner.flush_async().await?;
        Ok(())
    }
}
