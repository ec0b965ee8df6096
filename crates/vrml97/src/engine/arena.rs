use std::fmt;

/// Generational index into the arena.
/// Allows safe reuse of slots with use-after-free detection.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct NodeId {
    pub index: u32,
    pub generation: u32,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "@{}v{}", self.index, self.generation)
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Arena owning every node of a scene.
///
/// Node-to-node references (SFNode/MFNode values, routes) are [`NodeId`]s, so
/// cycles in the graph never keep anything alive; the arena is the only owner.
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free_list: Vec<u32>,
    live: usize,
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free_list: Vec::new(),
            live: 0,
        }
    }

    /// Allocate a new slot holding `value`.
    pub fn alloc(&mut self, value: T) -> NodeId {
        self.live += 1;
        if let Some(index) = self.free_list.pop() {
            // Generation was already bumped on free
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            NodeId {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                value: Some(value),
            });
            NodeId {
                index,
                generation: 0,
            }
        }
    }

    /// Free a slot, making it available for reuse. Returns the value it held.
    pub fn free(&mut self, id: NodeId) -> Option<T> {
        if !self.is_valid(id) {
            return None;
        }
        let slot = &mut self.slots[id.index as usize];
        // Bump generation immediately to invalidate outstanding ids
        slot.generation = slot.generation.wrapping_add(1);
        self.free_list.push(id.index);
        self.live -= 1;
        slot.value.take()
    }

    /// Check if a NodeId is valid (correct generation, still occupied).
    pub fn is_valid(&self, id: NodeId) -> bool {
        self.slots
            .get(id.index as usize)
            .is_some_and(|slot| slot.generation == id.generation && slot.value.is_some())
    }

    pub fn get(&self, id: NodeId) -> Option<&T> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation == id.generation {
            slot.value.as_ref()
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut T> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation == id.generation {
            slot.value.as_mut()
        } else {
            None
        }
    }

    /// Number of live values.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Live ids in slot order.
    pub fn ids(&self) -> Vec<NodeId> {
        self.iter().map(|(id, _)| id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value.as_ref().map(|value| {
                (
                    NodeId {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    value,
                )
            })
        })
    }

    /// Drops every value; outstanding ids become invalid.
    pub fn clear(&mut self) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.value.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free_list.push(index as u32);
            }
        }
        self.live = 0;
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}
