use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

use serde::{Serialize, de::DeserializeOwned};

use crate::error::KernelError;
use crate::snapshot::ComposedSnapshot;

/// Exact-match hash index with snapshot support.
///
/// Snapshots hold the entries sorted by key, so equal contents always
/// serialize to equal bytes.
#[derive(Debug, Clone)]
pub struct HashIndex<K, V> {
    entries: HashMap<K, V>,
}

impl<K, V> Default for HashIndex<K, V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<K, V> HashIndex<K, V>
where
    K: Eq + Hash + Ord + Clone + Serialize + DeserializeOwned,
    V: Clone + Serialize + DeserializeOwned,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.get(key)
    }

    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.get_mut(key)
    }

    pub fn put(&mut self, key: K, value: V) -> Option<V> {
        self.entries.insert(key, value)
    }

    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.remove(key)
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entries in key order.
    pub fn sorted(&self) -> Vec<(&K, &V)> {
        let mut entries: Vec<_> = self.entries.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, KernelError> {
        serde_cbor::to_vec(&self.sorted()).map_err(|err| KernelError::Encode {
            what: "index snapshot",
            message: err.to_string(),
        })
    }

    /// Replaces the contents with the entries in `bytes`.
    pub fn restore(&mut self, bytes: &[u8]) -> Result<(), KernelError> {
        let entries: Vec<(K, V)> = serde_cbor::from_slice(bytes)
            .map_err(|err| KernelError::SnapshotDecode(err.to_string()))?;
        self.entries = entries.into_iter().collect();
        Ok(())
    }

    pub fn write_part(&self, name: &str, snapshot: &mut ComposedSnapshot) -> Result<(), KernelError> {
        snapshot.add(name, self.to_bytes()?);
        Ok(())
    }

    pub fn recover_part(&mut self, name: &str, snapshot: &ComposedSnapshot) -> Result<(), KernelError> {
        self.restore(snapshot.part(name)?)
    }
}
