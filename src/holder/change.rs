//! Change-event types delivered to live listeners.
//!
//! [`MapChange`] describes one element-level mutation of a map holder:
//! an insertion, a removal, or an update (which carries both the old and
//! the new value). [`SeqChange`] describes one batched notification from
//! a list holder; a single notification may carry removals and additions
//! together, and consumers process removals before additions.

/// One element-level change of a keyed collection.
///
/// An update is modelled as `removed && added` with both values present;
/// a pure removal is `removed && !added`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapChange<K, V> {
    key: K,
    removed: bool,
    added: bool,
    old_value: Option<V>,
    new_value: Option<V>,
}

impl<K, V> MapChange<K, V> {
    /// A key was inserted with `new_value` and had no previous value.
    pub fn added(key: K, new_value: V) -> Self {
        Self {
            key,
            removed: false,
            added: true,
            old_value: None,
            new_value: Some(new_value),
        }
    }

    /// A key was removed; `old_value` is the value it held.
    pub fn removed(key: K, old_value: V) -> Self {
        Self {
            key,
            removed: true,
            added: false,
            old_value: Some(old_value),
            new_value: None,
        }
    }

    /// A key's value was replaced.
    pub fn updated(key: K, old_value: V, new_value: V) -> Self {
        Self {
            key,
            removed: true,
            added: true,
            old_value: Some(old_value),
            new_value: Some(new_value),
        }
    }

    /// The key this change is about.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// The value present before the change, if any.
    pub fn old_value(&self) -> Option<&V> {
        self.old_value.as_ref()
    }

    /// The value present after the change, if any.
    pub fn new_value(&self) -> Option<&V> {
        self.new_value.as_ref()
    }

    /// Whether a value is present after this change.
    pub fn was_added(&self) -> bool {
        self.added
    }

    /// Whether a value was displaced by this change.
    pub fn was_removed(&self) -> bool {
        self.removed
    }

    /// The key left the collection with no replacement.
    pub fn is_pure_removal(&self) -> bool {
        self.removed && !self.added
    }

    /// An existing value was replaced by a new one.
    pub fn is_update(&self) -> bool {
        self.removed && self.added
    }
}

/// One batched notification from an ordered sequence.
///
/// Removals and additions may arrive in the same notification; every
/// consumer applies the removals first so that an element removed and
/// re-added in one batch ends up present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeqChange<V> {
    removed: Vec<V>,
    added: Vec<V>,
}

impl<V> SeqChange<V> {
    /// A batch carrying both removals and additions.
    pub fn new(removed: Vec<V>, added: Vec<V>) -> Self {
        Self { removed, added }
    }

    /// A batch carrying only additions.
    pub fn additions(added: Vec<V>) -> Self {
        Self {
            removed: Vec::new(),
            added,
        }
    }

    /// A batch carrying only removals.
    pub fn removals(removed: Vec<V>) -> Self {
        Self {
            removed,
            added: Vec::new(),
        }
    }

    /// Elements removed in this batch.
    pub fn removed(&self) -> &[V] {
        &self.removed
    }

    /// Elements added in this batch, in source delivery order.
    pub fn added(&self) -> &[V] {
        &self.added
    }

    /// Whether the batch carries no changes at all.
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_change_added() {
        let change = MapChange::added("k", 1);
        assert_eq!(change.key(), &"k");
        assert!(change.was_added());
        assert!(!change.was_removed());
        assert!(!change.is_pure_removal());
        assert!(!change.is_update());
        assert_eq!(change.old_value(), None);
        assert_eq!(change.new_value(), Some(&1));
    }

    #[test]
    fn test_map_change_removed() {
        let change = MapChange::removed("k", 1);
        assert!(change.is_pure_removal());
        assert!(!change.is_update());
        assert_eq!(change.old_value(), Some(&1));
        assert_eq!(change.new_value(), None);
    }

    #[test]
    fn test_map_change_updated() {
        let change = MapChange::updated("k", 1, 2);
        assert!(change.was_added());
        assert!(change.was_removed());
        assert!(change.is_update());
        assert!(!change.is_pure_removal());
        assert_eq!(change.old_value(), Some(&1));
        assert_eq!(change.new_value(), Some(&2));
    }

    #[test]
    fn test_seq_change_batches() {
        let batch = SeqChange::new(vec![1], vec![2, 3]);
        assert_eq!(batch.removed(), &[1]);
        assert_eq!(batch.added(), &[2, 3]);
        assert!(!batch.is_empty());

        let empty: SeqChange<i32> = SeqChange::default();
        assert!(empty.is_empty());
    }
}
