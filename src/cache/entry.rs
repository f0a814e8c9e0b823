//! Memory Entry Module
//!
//! Defines a single decoded object held by the memory tier.

use std::sync::Arc;

// == Memory Entry ==
/// A decoded object plus the byte-size hint used for budget accounting.
#[derive(Debug)]
pub struct MemoryEntry<V> {
    /// The decoded object, shared with every caller that received it
    pub value: Arc<V>,
    /// Size hint in bytes; 0 means the entry is not counted against the budget
    pub size: u64,
}

impl<V> MemoryEntry<V> {
    pub fn new(value: Arc<V>, size: u64) -> Self {
        Self { value, size }
    }

    /// Whether this entry counts against the memory budget.
    pub fn is_tracked(&self) -> bool {
        self.size > 0
    }
}

impl<V> Clone for MemoryEntry<V> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            size: self.size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untracked_entry() {
        let entry = MemoryEntry::new(Arc::new("v".to_string()), 0);
        assert!(!entry.is_tracked());
    }

    #[test]
    fn test_clone_shares_value() {
        let entry = MemoryEntry::new(Arc::new(vec![1u8, 2, 3]), 3);
        let copy = entry.clone();
        assert!(copy.is_tracked());
        assert!(Arc::ptr_eq(&entry.value, &copy.value));
    }
}
