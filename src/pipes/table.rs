//! Fixed-size table of pipe records
//!
//! Pipe identifiers carry a slot index and a generation; deleting a pipe
//! bumps its slot's generation, so a stale identifier can never alias a
//! recycled slot.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{BusError, Result};
use crate::identity::AppId;

use super::pipe::Pipe;

/// Pipe identifier: slot index in the low half, generation in the high half
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PipeId(u32);

impl PipeId {
    pub(crate) fn new(index: u16, generation: u16) -> Self {
        Self((u32::from(generation) << 16) | u32::from(index))
    }

    /// Reconstruct an identifier from its raw value
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Raw identifier value
    pub fn raw(&self) -> u32 {
        self.0
    }

    pub(crate) fn index(&self) -> usize {
        (self.0 & 0xFFFF) as usize
    }

    pub(crate) fn generation(&self) -> u16 {
        (self.0 >> 16) as u16
    }
}

impl fmt::Display for PipeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pipe({}.{})", self.index(), self.generation())
    }
}

#[derive(Debug)]
struct PipeSlot {
    generation: u16,
    pipe: Option<Pipe>,
}

/// Fixed array of pipe slots
#[derive(Debug)]
pub struct PipeTable {
    slots: Vec<PipeSlot>,
    in_use: usize,
    peak_in_use: usize,
}

impl PipeTable {
    /// Create a table with `max_pipes` slots
    pub fn new(max_pipes: usize) -> Self {
        Self {
            slots: (0..max_pipes)
                .map(|_| PipeSlot {
                    generation: 0,
                    pipe: None,
                })
                .collect(),
            in_use: 0,
            peak_in_use: 0,
        }
    }

    /// Allocate the first free slot for a new pipe
    pub fn create(&mut self, name: &str, owner: AppId, depth: usize) -> Result<PipeId> {
        if self.find_by_name(name).is_some() {
            return Err(BusError::name_taken(name));
        }
        let index = self
            .slots
            .iter()
            .position(|slot| slot.pipe.is_none())
            .ok_or(BusError::MaxPipesReached {
                max: self.slots.len(),
            })?;

        let slot = &mut self.slots[index];
        let id = PipeId::new(index as u16, slot.generation);
        slot.pipe = Some(Pipe::new(id, name.to_string(), owner, depth));
        self.in_use += 1;
        if self.in_use > self.peak_in_use {
            self.peak_in_use = self.in_use;
        }
        Ok(id)
    }

    /// Pipe for an identifier, if it still exists
    pub fn get(&self, id: PipeId) -> Option<&Pipe> {
        let slot = self.slots.get(id.index())?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.pipe.as_ref()
    }

    /// Mutable pipe for an identifier, if it still exists
    pub fn get_mut(&mut self, id: PipeId) -> Option<&mut Pipe> {
        let slot = self.slots.get_mut(id.index())?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.pipe.as_mut()
    }

    /// Remove a pipe, bumping the slot generation
    pub fn remove(&mut self, id: PipeId) -> Option<Pipe> {
        let slot = self.slots.get_mut(id.index())?;
        if slot.generation != id.generation() {
            return None;
        }
        let pipe = slot.pipe.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.in_use -= 1;
        Some(pipe)
    }

    /// Pipe identifier for a name
    pub fn find_by_name(&self, name: &str) -> Option<PipeId> {
        self.slots
            .iter()
            .filter_map(|slot| slot.pipe.as_ref())
            .find(|pipe| pipe.name == name)
            .map(|pipe| pipe.id)
    }

    /// Iterate over existing pipes in slot order
    pub fn iter(&self) -> impl Iterator<Item = &Pipe> {
        self.slots.iter().filter_map(|slot| slot.pipe.as_ref())
    }

    /// Number of pipes currently in use
    pub fn len(&self) -> usize {
        self.in_use
    }

    /// Whether no pipes exist
    pub fn is_empty(&self) -> bool {
        self.in_use == 0
    }

    /// Peak number of pipes in use simultaneously
    pub fn peak(&self) -> usize {
        self.peak_in_use
    }
}
