use derive_more::Display;
use tracing::debug;

use crate::project::uri;

/// Handle naming a virtual path that an asynchronous request still cares about.
///
/// Handles are generation-counted: once the slot is released or invalidated
/// the handle no longer resolves, even if the slot is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[display("ref#{index}@{generation}")]
pub struct Reference {
    index: u32,
    generation: u32,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

#[derive(Debug)]
struct Entry {
    path: String,
    holders: u32,
}

#[derive(Debug, Default)]
pub struct ReferenceTable {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl ReferenceTable {
    pub fn insert(&mut self, path: impl Into<String>) -> Reference {
        let entry = Entry {
            path: path.into(),
            holders: 1,
        };
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(entry);
            return Reference {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            entry: Some(entry),
        });
        Reference {
            index,
            generation: 0,
        }
    }

    fn entry(&self, reference: Reference) -> Option<&Entry> {
        self.slots
            .get(reference.index as usize)
            .filter(|slot| slot.generation == reference.generation)
            .and_then(|slot| slot.entry.as_ref())
    }

    fn entry_mut(&mut self, reference: Reference) -> Option<&mut Entry> {
        self.slots
            .get_mut(reference.index as usize)
            .filter(|slot| slot.generation == reference.generation)
            .and_then(|slot| slot.entry.as_mut())
    }

    /// Current virtual path of a live handle.
    pub fn resolve(&self, reference: Reference) -> Option<&str> {
        self.entry(reference).map(|entry| entry.path.as_str())
    }

    pub fn retain(&mut self, reference: Reference) -> bool {
        match self.entry_mut(reference) {
            Some(entry) => {
                entry.holders += 1;
                true
            }
            None => false,
        }
    }

    pub fn release(&mut self, reference: Reference) {
        let Some(entry) = self.entry_mut(reference) else {
            return;
        };
        entry.holders -= 1;
        if entry.holders == 0 {
            self.vacate(reference.index);
        }
    }

    fn vacate(&mut self, index: u32) {
        let slot = &mut self.slots[index as usize];
        slot.entry = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);
    }

    /// Follows a rename of `old_path` (and everything below it) to `new_path`.
    pub fn rename_prefix(&mut self, old_path: &str, new_path: &str) {
        for slot in &mut self.slots {
            if let Some(entry) = slot.entry.as_mut() {
                if let Some(moved) = uri::rebase(&entry.path, old_path, new_path) {
                    entry.path = moved;
                }
            }
        }
    }

    /// Invalidates every handle naming `path` or a path below it.
    pub fn invalidate_under(&mut self, path: &str) {
        let stale = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| {
                slot.entry
                    .as_ref()
                    .is_some_and(|entry| uri::is_ancestor_or_self(path, &entry.path))
            })
            .map(|(index, _)| index as u32)
            .collect::<Vec<_>>();
        for index in stale {
            self.vacate(index);
        }
    }

    pub fn invalidate_all(&mut self) {
        let live = self.len();
        for index in 0..self.slots.len() as u32 {
            if self.slots[index as usize].entry.is_some() {
                self.vacate(index);
            }
        }
        debug!("Invalidated {} live references", live);
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.entry.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
