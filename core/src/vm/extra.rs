//! Per-unit side-channel storage.
//!
//! An [`ExtraRegistry`] hands out [`ExtraIndex`] values; each index names one
//! opaque slot on every [`Code`](super::Code). The registry lives on the
//! interpreter, so an index is only meaningful for units run by it.

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::{Result, bail};

/// Hard cap on registered slot users per interpreter.
pub const MAX_EXTRA_USERS: usize = 255;

pub type ExtraValue = Arc<dyn Any + Send + Sync>;

/// Slot index obtained from [`ExtraRegistry::request`]. There is no public
/// constructor, so holding one proves the slot was registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExtraIndex(usize);

impl ExtraIndex {
    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

#[derive(Debug, Default)]
pub struct ExtraRegistry {
    next: AtomicUsize,
}

impl ExtraRegistry {
    pub const fn new() -> Self {
        Self {
            next: AtomicUsize::new(0),
        }
    }

    pub fn request(&self) -> Result<ExtraIndex> {
        let claimed = self
            .next
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < MAX_EXTRA_USERS).then_some(n + 1)
            });
        match claimed {
            Ok(idx) => Ok(ExtraIndex(idx)),
            Err(_) => bail!("no more extra slots: {} users already registered", MAX_EXTRA_USERS),
        }
    }

    pub fn registered(&self) -> usize {
        self.next.load(Ordering::Acquire)
    }
}

/// The slot table carried by each code unit. Grows lazily on first write.
///
/// A write swaps the whole `Arc` under the lock: concurrent writers may lose
/// an update, readers never see a partially written value.
#[derive(Default)]
pub struct ExtraSlots {
    slots: RwLock<Vec<Option<ExtraValue>>>,
}

impl ExtraSlots {
    pub fn get(&self, idx: ExtraIndex) -> Option<ExtraValue> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots.get(idx.0).cloned().flatten()
    }

    pub fn set(&self, idx: ExtraIndex, value: Option<ExtraValue>) -> Option<ExtraValue> {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        if slots.len() <= idx.0 {
            if value.is_none() {
                return None;
            }
            slots.resize_with(idx.0 + 1, || None);
        }
        std::mem::replace(&mut slots[idx.0], value)
    }
}
