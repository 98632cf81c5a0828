//! Lock-guarded entry table shared between the caller and compression tasks.
//!
//! Every structural change (reserve, land, insert, delete) goes through one
//! `parking_lot::Mutex`. A name whose compression is still in flight holds a
//! `Pending` slot; deletes of such a name wait on the condvar until the task
//! lands or fails.

use crate::PackError;
use crate::Result;
use crate::types::EntryName;
use crate::writer::staged::StagedEntry;
use parking_lot::Condvar;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug)]
enum Slot {
    Pending,
    Staged { arrival: u64, entry: StagedEntry },
}

#[derive(Debug, Default)]
struct Table {
    slots: HashMap<EntryName, Slot>,
    next_arrival: u64,
    append_only: bool,
    deleted: usize,
}

impl Table {
    fn stage(&mut self, entry: StagedEntry) {
        let arrival = self.next_arrival;
        self.next_arrival += 1;
        self.slots
            .insert(entry.name.clone(), Slot::Staged { arrival, entry });
    }
}

/// Entries drained from the table at close, with their arrival order.
#[derive(Debug)]
pub(crate) struct Drained {
    pub entries: Vec<(u64, StagedEntry)>,
    pub deleted: usize,
}

/// Shared entry table.
#[derive(Debug, Default)]
pub(crate) struct SharedState {
    table: Mutex<Table>,
    landed: Condvar,
}

impl SharedState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claims `name` for an asynchronous write.
    pub fn reserve(&self, name: &EntryName) -> Result<()> {
        let mut table = self.table.lock();
        if table.slots.contains_key(name) {
            return Err(PackError::DuplicateEntry {
                path: name.to_string(),
            });
        }
        table.slots.insert(name.clone(), Slot::Pending);
        Ok(())
    }

    /// Fills a reserved slot.
    pub fn land(&self, entry: StagedEntry) {
        let mut table = self.table.lock();
        table.stage(entry);
        drop(table);
        self.landed.notify_all();
    }

    /// Frees a reserved slot whose task failed.
    pub fn release(&self, name: &EntryName) {
        let mut table = self.table.lock();
        if matches!(table.slots.get(name), Some(Slot::Pending)) {
            table.slots.remove(name);
        }
        drop(table);
        self.landed.notify_all();
    }

    /// Adds a staged entry synchronously.
    pub fn insert(&self, entry: StagedEntry) -> Result<()> {
        let mut table = self.table.lock();
        if table.slots.contains_key(&entry.name) {
            return Err(PackError::DuplicateEntry {
                path: entry.name.to_string(),
            });
        }
        table.stage(entry);
        Ok(())
    }

    /// Fails with `DuplicateEntry` if any of `names` is taken.
    pub fn ensure_free<'a>(&self, names: impl IntoIterator<Item = &'a EntryName>) -> Result<()> {
        let table = self.table.lock();
        for name in names {
            if table.slots.contains_key(name) {
                return Err(PackError::DuplicateEntry {
                    path: name.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Switches the session to append-only; deletes fail from now on.
    pub fn commit_append_only(&self) {
        self.table.lock().append_only = true;
    }

    pub fn is_append_only(&self) -> bool {
        self.table.lock().append_only
    }

    /// Removes an entry, waiting for an in-flight write to the same name.
    pub fn delete(&self, name: &EntryName) -> Result<()> {
        let mut table = self.table.lock();
        if table.append_only {
            return Err(PackError::IllegalState {
                reason: format!(
                    "cannot delete '{name}': entries were bulk-copied from an archive, \
                     the session is append-only"
                ),
            });
        }
        while matches!(table.slots.get(name), Some(Slot::Pending)) {
            self.landed.wait(&mut table);
        }
        if table.slots.remove(name).is_none() {
            return Err(PackError::EntryNotFound {
                path: name.to_string(),
            });
        }
        table.deleted += 1;
        Ok(())
    }

    /// Number of entries present or in flight.
    pub fn len(&self) -> usize {
        self.table.lock().slots.len()
    }

    /// Takes every staged entry out of the table.
    ///
    /// Must be called after all tasks have been joined; any slot still
    /// pending at that point belongs to a failed task and is dropped.
    pub fn drain(&self) -> Drained {
        let mut table = self.table.lock();
        let entries = table
            .slots
            .drain()
            .filter_map(|(_, slot)| match slot {
                Slot::Staged { arrival, entry } => Some((arrival, entry)),
                Slot::Pending => None,
            })
            .collect();
        Drained {
            entries,
            deleted: table.deleted,
        }
    }
}

/// Owns a `Pending` slot until the entry lands.
///
/// Dropping the guard without landing (task error or panic) releases the
/// slot so waiting deletes make progress.
pub(crate) struct PendingGuard {
    state: Arc<SharedState>,
    name: Option<EntryName>,
}

impl PendingGuard {
    pub fn new(state: Arc<SharedState>, name: EntryName) -> Self {
        Self {
            state,
            name: Some(name),
        }
    }

    pub fn land(mut self, entry: StagedEntry) {
        self.name = None;
        self.state.land(entry);
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if let Some(name) = self.name.take() {
            self.state.release(&name);
        }
    }
}
