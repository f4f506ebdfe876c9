//! Redb-based persistent key-value store.

use std::fmt::Display;
use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};

use crate::{KvError, KvResult, KvStore};

const TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("kv");

fn storage<E: Display>(e: E) -> KvError {
    KvError::Storage(e.to_string())
}

/// A persistent key-value store backed by a single redb file.
///
/// redb serializes write transactions, so the guard check and the writes of
/// [`KvStore::compare_and_swap`] happen inside one transaction.
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open or create a redb store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> KvResult<Self> {
        let db = Database::create(path).map_err(storage)?;

        // Create the table up front so readers never see it missing.
        let tx = db.begin_write().map_err(storage)?;
        tx.open_table(TABLE).map_err(storage)?;
        tx.commit().map_err(storage)?;

        Ok(Self { db })
    }

    fn write<F>(&self, f: F) -> KvResult<bool>
    where
        F: FnOnce(&mut redb::Table<'_, &'static str, &'static [u8]>) -> KvResult<bool>,
    {
        let tx = self.db.begin_write().map_err(storage)?;
        let commit = {
            let mut table = tx.open_table(TABLE).map_err(storage)?;
            f(&mut table)?
        };
        if commit {
            tx.commit().map_err(storage)?;
        } else {
            tx.abort().map_err(storage)?;
        }
        Ok(commit)
    }
}

impl KvStore for RedbStore {
    fn get(&self, key: &str) -> KvResult<Option<Vec<u8>>> {
        Ok(self.batch_get(&[key])?.pop().flatten())
    }

    fn set(&self, key: &str, value: &[u8]) -> KvResult<()> {
        self.write(|table| {
            table.insert(key, value).map_err(storage)?;
            Ok(true)
        })?;
        Ok(())
    }

    fn delete(&self, key: &str) -> KvResult<()> {
        self.write(|table| {
            table.remove(key).map_err(storage)?;
            Ok(true)
        })?;
        Ok(())
    }

    fn batch_get(&self, keys: &[&str]) -> KvResult<Vec<Option<Vec<u8>>>> {
        let tx = self.db.begin_read().map_err(storage)?;
        let table = tx.open_table(TABLE).map_err(storage)?;

        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            let value = table.get(*key).map_err(storage)?;
            out.push(value.map(|v| v.value().to_vec()));
        }
        Ok(out)
    }

    fn compare_and_swap(
        &self,
        guard: &str,
        expected: Option<&[u8]>,
        entries: &[(&str, &[u8])],
    ) -> KvResult<bool> {
        self.write(|table| {
            let current = table
                .get(guard)
                .map_err(storage)?
                .map(|v| v.value().to_vec());
            if current.as_deref() != expected {
                return Ok(false);
            }
            for (key, value) in entries {
                table.insert(*key, *value).map_err(storage)?;
            }
            Ok(true)
        })
    }
}
