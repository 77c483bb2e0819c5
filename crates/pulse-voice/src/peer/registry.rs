use std::collections::HashMap;

use pulse_common::ParticipantId;

/// Index plus generation. A key stops resolving once its slot is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotKey {
    index: u32,
    generation: u32,
}

struct Slot<T> {
    generation: u32,
    entry: Option<(ParticipantId, T)>,
}

/// Generational arena keyed by participant id, at most one entry per id.
pub struct Registry<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    by_id: HashMap<ParticipantId, SlotKey>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            by_id: HashMap::new(),
        }
    }
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value built from its own key. Returns `None` without
    /// calling `build` if `id` already has an entry.
    pub fn insert_with(
        &mut self,
        id: ParticipantId,
        build: impl FnOnce(SlotKey) -> T,
    ) -> Option<SlotKey> {
        if self.by_id.contains_key(&id) {
            return None;
        }
        let key = match self.free.pop() {
            Some(index) => SlotKey {
                index,
                generation: self.slots[index as usize].generation,
            },
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    entry: None,
                });
                SlotKey {
                    index: (self.slots.len() - 1) as u32,
                    generation: 0,
                }
            }
        };
        let value = build(key);
        self.slots[key.index as usize].entry = Some((id.clone(), value));
        self.by_id.insert(id, key);
        Some(key)
    }

    pub fn get(&self, key: SlotKey) -> Option<&T> {
        let slot = self.slots.get(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        slot.entry.as_ref().map(|(_, value)| value)
    }

    pub fn get_mut(&mut self, key: SlotKey) -> Option<&mut T> {
        let slot = self.slots.get_mut(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        slot.entry.as_mut().map(|(_, value)| value)
    }

    pub fn key_of(&self, id: &ParticipantId) -> Option<SlotKey> {
        self.by_id.get(id).copied()
    }

    pub fn get_by_id(&self, id: &ParticipantId) -> Option<&T> {
        self.get(self.key_of(id)?)
    }

    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.by_id.contains_key(id)
    }

    /// Remove the entry and retire the key.
    pub fn remove(&mut self, key: SlotKey) -> Option<T> {
        let slot = self.slots.get_mut(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        let (id, value) = slot.entry.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(key.index);
        self.by_id.remove(&id);
        Some(value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (SlotKey, &ParticipantId, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.entry.as_ref().map(|(id, value)| {
                (
                    SlotKey {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    id,
                    value,
                )
            })
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.slots
            .iter_mut()
            .filter_map(|slot| slot.entry.as_mut().map(|(_, value)| value))
    }

    pub fn keys(&self) -> Vec<SlotKey> {
        self.iter().map(|(key, _, _)| key).collect()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
