use crate::{
    arena::{Arena, ArenaSpan, MemoryBudget},
    LmError,
};
use debug_unsafe::slice::SliceGetter;

/// Slots per entry.
const TABLE_FACTOR: f64 = 2.0;

/// Open-addressed index over a run of entries stored elsewhere.
/// Slots hold `entry + 1`, zero is empty; collisions step linearly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct OpenTable {
    span: ArenaSpan,
}

impl OpenTable {
    #[inline]
    pub(crate) fn slots_for(entries: usize) -> usize {
        ((entries as f64 * TABLE_FACTOR).ceil() as usize)
            .max(2)
            .next_power_of_two()
    }

    pub(crate) fn allocate(
        slots: &mut Arena<u32>,
        entries: usize,
        budget: &mut MemoryBudget,
    ) -> Result<Self, LmError> {
        Ok(Self {
            span: slots.allocate(Self::slots_for(entries), budget)?,
        })
    }

    #[inline]
    pub(crate) fn is_allocated(self) -> bool {
        !self.span.is_empty()
    }

    pub(crate) fn insert(self, slots: &mut Arena<u32>, hash: u64, entry: u32) {
        let table = slots.get_mut(self.span);
        let mask = table.len() - 1;
        let mut i = hash as usize & mask;
        while table[i] != 0 {
            i = (i + 1) & mask;
        }
        table[i] = entry + 1;
    }

    #[inline]
    pub(crate) fn find(
        self,
        slots: &Arena<u32>,
        hash: u64,
        mut is_match: impl FnMut(u32) -> bool,
    ) -> Option<u32> {
        let table = slots.get(self.span);
        if table.is_empty() {
            return None;
        }
        let mask = table.len() - 1;
        let mut i = hash as usize & mask;
        loop {
            let slot = *table.get_safe_unchecked(i);
            if slot == 0 {
                return None;
            }
            if is_match(slot - 1) {
                return Some(slot - 1);
            }
            i = (i + 1) & mask;
        }
    }
}
