use std::fmt;
use std::sync::Arc;

use crate::vm::{Code, Frame};

/// Guard predicate attached to a cached replacement. Opaque to the cache: it
/// is stored and handed back, never run here.
pub type CheckFn = Arc<dyn Fn(&Frame) -> bool + Send + Sync>;

/// Hit descriptor returned by a frame callback.
#[derive(Clone)]
pub struct GuardedCode {
    pub check_fn: CheckFn,
    pub code: Arc<Code>,
}

impl GuardedCode {
    pub fn new<F>(check_fn: F, code: Arc<Code>) -> Self
    where
        F: Fn(&Frame) -> bool + Send + Sync + 'static,
    {
        Self {
            check_fn: Arc::new(check_fn),
            code,
        }
    }
}

impl fmt::Debug for GuardedCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardedCode").field("code", &self.code.name()).finish()
    }
}

#[derive(Clone)]
pub struct CacheEntry {
    check_fn: CheckFn,
    code: Arc<Code>,
}

impl CacheEntry {
    pub fn check_fn(&self) -> &CheckFn {
        &self.check_fn
    }

    pub fn code(&self) -> &Arc<Code> {
        &self.code
    }
}

impl From<GuardedCode> for CacheEntry {
    fn from(guarded: GuardedCode) -> Self {
        Self {
            check_fn: guarded.check_fn,
            code: guarded.code,
        }
    }
}

impl fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry").field("code", &self.code.name()).finish()
    }
}

/// Cached replacements for one code unit.
///
/// `Skip` is terminal: the unit runs on the default evaluator from then on
/// and is never offered to the callback again.
#[derive(Clone, Debug, Default)]
pub enum CacheState {
    #[default]
    Empty,
    Skip,
    /// Oldest first; the head is the last element.
    Entries(Vec<CacheEntry>),
}

impl CacheState {
    /// Number of real entries. `Skip` counts as zero.
    pub fn len(&self) -> usize {
        match self {
            CacheState::Entries(entries) => entries.len(),
            CacheState::Empty | CacheState::Skip => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, CacheState::Skip)
    }

    /// Most recently added entry.
    pub fn head(&self) -> Option<&CacheEntry> {
        match self {
            CacheState::Entries(entries) => entries.last(),
            _ => None,
        }
    }

    /// Entries newest first.
    pub fn iter(&self) -> impl Iterator<Item = &CacheEntry> {
        let entries: &[CacheEntry] = match self {
            CacheState::Entries(entries) => entries,
            _ => &[],
        };
        entries.iter().rev()
    }

    /// Returns a new state with `entry` as head. Existing entries keep their
    /// order and are never merged with the new one.
    ///
    /// The protocol never prepends onto `Skip`; doing so directly starts a
    /// fresh list.
    pub fn prepend(&self, entry: CacheEntry) -> CacheState {
        let mut entries = match self {
            CacheState::Entries(entries) => {
                let mut next = Vec::with_capacity(entries.len() + 1);
                next.extend(entries.iter().cloned());
                next
            }
            CacheState::Empty | CacheState::Skip => Vec::with_capacity(1),
        };
        entries.push(entry);
        CacheState::Entries(entries)
    }
}
