//! Derived holders — pure, automatically maintained functions of a
//! source holder.
//!
//! Each constructor allocates an empty target [`MapHolder`], registers a
//! live listener on the source that translates every change into a
//! target mutation, and registers a received listener so that every
//! batch completion on the source propagates to the target (including
//! the first one, which opens the target's gate).
//!
//! Locking discipline: the source's lock is held while the wiring
//! mutates the target, which takes the target's own lock. The order is
//! always source before target, and wiring code never calls back into
//! the source, so the chain cannot deadlock. External callers should
//! treat a derived holder as read-only; its producer surface is driven
//! by the wiring alone.
//!
//! Derivations hold strong registrations on their source. Dropping the
//! last user handle on the target does not stop propagation; call
//! [`MapHolder::disconnect`] on the target to sever the wiring.

use std::fmt::Debug;
use std::hash::Hash;

use crate::error::TransformError;
use crate::holder::list_holder::ListHolder;
use crate::holder::map_holder::MapHolder;
use crate::holder::subscription::SubscriptionId;

/// Build a holder whose entries are `f` applied to each value of
/// `source`, under the same keys.
///
/// Existing entries are mapped at construction time; insertions,
/// updates, and removals on the source are mirrored from then on. The
/// target's gate opens when the source's does.
///
/// ```
/// use collection_holders::{map_values, MapHolder};
///
/// let raw: MapHolder<&str, u32> = MapHolder::new();
/// let scaled = map_values(&raw, |cents| u64::from(*cents) * 10);
///
/// raw.put("a", 1);
/// raw.put("b", 2);
/// raw.data_received();
///
/// assert_eq!(scaled.get(&"a").unwrap(), Some(10));
/// assert_eq!(scaled.get(&"b").unwrap(), Some(20));
/// ```
pub fn map_values<K, S, T, F>(source: &MapHolder<K, S>, f: F) -> MapHolder<K, T>
where
    K: Eq + Hash + Clone + Send + 'static,
    S: Clone + Send + 'static,
    T: Clone + Send + 'static,
    F: Fn(&S) -> T + Send + 'static,
{
    let target = MapHolder::new();

    let sink = target.clone();
    let follow_id = source.follow(move |change| {
        if change.is_pure_removal() {
            sink.remove(change.key());
        } else if let Some(new_value) = change.new_value() {
            sink.put(change.key().clone(), f(new_value));
        }
    });

    let sink = target.clone();
    let received_id = source.add_received_listener(move |_snapshot| sink.data_received());

    record_map_upstream(&target, source, follow_id, received_id);
    target
}

/// Like [`map_values`], but the transform may fail per entry.
///
/// Failure policy: the failing key is not upserted, and any previously
/// mapped value under that key is removed so a stale entry never
/// outlives a failed re-map. The failure is logged at WARN and handed to
/// `on_error`; the rest of the batch and the notifying producer thread
/// are unaffected.
pub fn try_map_values<K, S, T, F, E>(
    source: &MapHolder<K, S>,
    f: F,
    on_error: E,
) -> MapHolder<K, T>
where
    K: Eq + Hash + Clone + Debug + Send + 'static,
    S: Clone + Send + 'static,
    T: Clone + Send + 'static,
    F: Fn(&S) -> anyhow::Result<T> + Send + 'static,
    E: Fn(TransformError<K>) + Send + 'static,
{
    let target = MapHolder::new();

    let sink = target.clone();
    let follow_id = source.follow(move |change| {
        if change.is_pure_removal() {
            sink.remove(change.key());
        } else if let Some(new_value) = change.new_value() {
            match f(new_value) {
                Ok(mapped) => {
                    sink.put(change.key().clone(), mapped);
                }
                Err(error) => {
                    sink.remove(change.key());
                    log::warn!(
                        "dropping derived entry for key {:?}: transform failed: {error:#}",
                        change.key()
                    );
                    on_error(TransformError {
                        key: change.key().clone(),
                        error,
                    });
                }
            }
        }
    });

    let sink = target.clone();
    let received_id = source.add_received_listener(move |_snapshot| sink.data_received());

    record_map_upstream(&target, source, follow_id, received_id);
    target
}

/// Re-key an ordered sequence into a map using `key_fn`, keeping the
/// elements themselves as values.
///
/// Within one source batch, removals are applied before additions, so an
/// element removed and re-added under the same key ends up with the
/// re-added value. When several elements of one batch map to the same
/// key, the last one in source delivery order wins.
pub fn from_sequence<K, V, KF>(source: &ListHolder<V>, key_fn: KF) -> MapHolder<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
    KF: Fn(&V) -> K + Send + 'static,
{
    from_sequence_mapped(source, key_fn, |v| v.clone())
}

/// Re-key an ordered sequence into a map, additionally remapping each
/// element to a new value type. Same ordering and collision rules as
/// [`from_sequence`].
pub fn from_sequence_mapped<K, V, L, KF, VF>(
    source: &ListHolder<V>,
    key_fn: KF,
    value_fn: VF,
) -> MapHolder<K, L>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
    L: Clone + Send + 'static,
    KF: Fn(&V) -> K + Send + 'static,
    VF: Fn(&V) -> L + Send + 'static,
{
    let target = MapHolder::new();

    let sink = target.clone();
    let follow_id = source.follow(move |batch| {
        // Removals first: a key removed and re-added in one batch must
        // end up with the re-added value.
        for removed in batch.removed() {
            sink.remove(&key_fn(removed));
        }
        for added in batch.added() {
            sink.put(key_fn(added), value_fn(added));
        }
    });

    let sink = target.clone();
    let received_id = source.add_received_listener(move |_items| sink.data_received());

    let src = source.clone();
    target.record_upstream(Box::new(move || {
        src.unfollow(follow_id);
    }));
    let src = source.clone();
    target.record_upstream(Box::new(move || {
        src.rem_received_listener(received_id);
    }));

    target
}

fn record_map_upstream<K, S, T>(
    target: &MapHolder<K, T>,
    source: &MapHolder<K, S>,
    follow_id: SubscriptionId,
    received_id: SubscriptionId,
) where
    K: Eq + Hash + Clone + Send + 'static,
    S: Clone + Send + 'static,
    T: Clone + Send + 'static,
{
    let src = source.clone();
    target.record_upstream(Box::new(move || {
        src.unfollow(follow_id);
    }));
    let src = source.clone();
    target.record_upstream(Box::new(move || {
        src.rem_received_listener(received_id);
    }));
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
