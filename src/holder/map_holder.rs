//! Synchronized holder around a mutable keyed collection.
//!
//! A [`MapHolder`] is shared between one producer and many consumers.
//! The producer fills the backing map incrementally (`put`, `remove`,
//! `put_all`) and closes each self-consistent batch with
//! [`data_received`](MapHolder::data_received). Consumers either block
//! until the first batch (`get`, `copy`, `wait_data`), subscribe to the
//! element-level change feed (`follow`), or subscribe to per-batch
//! snapshots (`add_received_listener`).
//!
//! One mutex per holder guards the backing map, both listener
//! registries, and the gate state. Listeners are invoked while that lock
//! is held, so delivery order always matches mutation order; in exchange
//! a listener must never call back into the holder it is registered on,
//! and must be fast. Cross-holder wiring (see [`derive`](super::derive))
//! always acquires the source's lock before the target's.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::error::HolderError;
use crate::holder::change::MapChange;
use crate::holder::gate::Gate;
use crate::holder::subscription::SubscriptionId;

// ---------------------------------------------------------------------------
// Listener and wiring type aliases
// ---------------------------------------------------------------------------

type LiveListener<K, V> = Box<dyn FnMut(&MapChange<K, V>) + Send>;
type BatchListener<K, V> = Box<dyn FnMut(&HashMap<K, V>) + Send>;
type Unsubscribe = Box<dyn FnOnce() + Send>;

// ---------------------------------------------------------------------------
// Guarded state
// ---------------------------------------------------------------------------

struct State<K, V> {
    backing: HashMap<K, V>,
    gate: Gate,
    live_listeners: Vec<(SubscriptionId, LiveListener<K, V>)>,
    batch_listeners: Vec<(SubscriptionId, BatchListener<K, V>)>,
    /// Teardown closures for wiring this holder holds on a source
    /// (populated by derivations, drained by `disconnect`).
    upstream: Vec<Unsubscribe>,
}

impl<K, V> State<K, V> {
    fn notify_live(&mut self, change: &MapChange<K, V>) {
        for (_, listener) in self.live_listeners.iter_mut() {
            listener(change);
        }
    }

    fn notify_batch(&mut self) {
        let State {
            backing,
            batch_listeners,
            ..
        } = self;
        for (_, callback) in batch_listeners.iter_mut() {
            callback(backing);
        }
    }
}

struct Inner<K, V> {
    state: Mutex<State<K, V>>,
    gate_cond: Condvar,
}

// ---------------------------------------------------------------------------
// MapHolder
// ---------------------------------------------------------------------------

/// Shared, synchronized holder of a mutable `K -> V` collection.
///
/// Cloning is cheap and yields another handle on the same holder; the
/// producer and every consumer each hold a clone.
///
/// # Example
///
/// ```
/// use collection_holders::MapHolder;
///
/// let prices: MapHolder<&str, u64> = MapHolder::new();
///
/// // Producer side: fill the map, then close the batch.
/// let feed = prices.clone();
/// feed.put("BTC", 64_000);
/// feed.put("ETH", 3_100);
/// feed.data_received();
///
/// // Consumer side: gated read.
/// assert_eq!(prices.get(&"BTC").unwrap(), Some(64_000));
/// assert_eq!(prices.copy().unwrap().len(), 2);
/// ```
pub struct MapHolder<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for MapHolder<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> fmt::Debug for MapHolder<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.state.try_lock() {
            Some(state) => f
                .debug_struct("MapHolder")
                .field("len", &state.backing.len())
                .field("gate", &state.gate)
                .finish_non_exhaustive(),
            None => write!(f, "MapHolder {{ <locked> }}"),
        }
    }
}

impl<K, V> Default for MapHolder<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> MapHolder<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Create an empty, unpopulated holder. Gated reads block until the
    /// producer's first [`data_received`](Self::data_received).
    pub fn new() -> Self {
        Self::with_gate(HashMap::new(), Gate::Unset)
    }

    /// Create a holder already populated with `backing`; the gate is set
    /// and gated reads return immediately.
    pub fn prefilled(backing: HashMap<K, V>) -> Self {
        Self::with_gate(backing, Gate::Received)
    }

    fn with_gate(backing: HashMap<K, V>, gate: Gate) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    backing,
                    gate,
                    live_listeners: Vec::new(),
                    batch_listeners: Vec::new(),
                    upstream: Vec::new(),
                }),
                gate_cond: Condvar::new(),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Gated reads
    // -----------------------------------------------------------------------

    /// Block until the first complete batch has arrived.
    ///
    /// Safe to call from any number of threads, repeatable, and never
    /// consumes the gate. Returns [`HolderError::WaitCancelled`] if
    /// [`cancel`](Self::cancel) fired before any data arrived. There is
    /// no built-in timeout; callers needing bounded waits must layer one
    /// externally.
    pub fn wait_data(&self) -> Result<(), HolderError> {
        let mut state = self.inner.state.lock();
        loop {
            match state.gate {
                Gate::Received => return Ok(()),
                Gate::Cancelled => return Err(HolderError::WaitCancelled),
                Gate::Unset => self.inner.gate_cond.wait(&mut state),
            }
        }
    }

    /// Wait for the first batch, then look up `key`.
    pub fn get(&self, key: &K) -> Result<Option<V>, HolderError> {
        self.wait_data()?;
        let state = self.inner.state.lock();
        Ok(state.backing.get(key).cloned())
    }

    /// Wait for the first batch, then return an independent snapshot of
    /// the backing map. Later mutations of the holder are not visible
    /// through the returned value.
    pub fn copy(&self) -> Result<HashMap<K, V>, HolderError> {
        self.wait_data()?;
        let state = self.inner.state.lock();
        Ok(state.backing.clone())
    }

    // -----------------------------------------------------------------------
    // Ungated accessors
    // -----------------------------------------------------------------------

    /// Number of entries currently in the backing map. Not gated;
    /// intended for the producer side and diagnostics.
    pub fn len(&self) -> usize {
        self.inner.state.lock().backing.len()
    }

    /// Whether the backing map is currently empty. Not gated.
    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().backing.is_empty()
    }

    /// Whether at least one complete batch has arrived. Not gated.
    pub fn has_data(&self) -> bool {
        self.inner.state.lock().gate.is_received()
    }

    // -----------------------------------------------------------------------
    // Live change feed
    // -----------------------------------------------------------------------

    /// Replay every current entry to `listener` as a synthetic `added`
    /// event, then register it for all future element-level changes.
    ///
    /// Replay and registration happen under one lock acquisition, so the
    /// replayed snapshot plus the live stream form an exactly-once,
    /// gap-free view of every historical and future mutation. The
    /// listener runs while the holder's lock is held: it must not call
    /// back into this holder and should return quickly.
    pub fn follow(
        &self,
        mut listener: impl FnMut(&MapChange<K, V>) + Send + 'static,
    ) -> SubscriptionId {
        let mut state = self.inner.state.lock();
        for (key, value) in state.backing.iter() {
            listener(&MapChange::added(key.clone(), value.clone()));
        }
        let id = SubscriptionId::next();
        state.live_listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a listener registered via [`follow`](Self::follow) or
    /// [`MapObservable::subscribe`]. Returns whether it was present;
    /// removing an already-removed listener is a no-op.
    pub fn unfollow(&self, id: SubscriptionId) -> bool {
        let mut state = self.inner.state.lock();
        let before = state.live_listeners.len();
        state.live_listeners.retain(|(sid, _)| *sid != id);
        state.live_listeners.len() != before
    }

    /// A handle for subscribing to raw mutation events without the
    /// historical replay of [`follow`](Self::follow), independent of the
    /// received gate.
    pub fn as_observable(&self) -> MapObservable<K, V> {
        MapObservable {
            inner: Arc::clone(&self.inner),
        }
    }

    // -----------------------------------------------------------------------
    // Batch lifecycle
    // -----------------------------------------------------------------------

    /// Declare the current batch of mutations complete.
    ///
    /// Sets the received gate on the first call (waking every blocked
    /// `wait_data`), then synchronously invokes each registered batch
    /// listener with the current backing map. Later calls leave the gate
    /// untouched but still re-notify batch listeners, including for the
    /// degenerate empty batch.
    pub fn data_received(&self) {
        let mut state = self.inner.state.lock();
        if state.gate == Gate::Unset {
            state.gate = Gate::Received;
            self.inner.gate_cond.notify_all();
        }
        state.notify_batch();
    }

    /// Register a per-batch snapshot callback.
    ///
    /// If the gate is already set, `callback` is invoked synchronously
    /// once with the current backing map before this method returns, so
    /// a late subscriber never waits for a batch that will not come.
    pub fn add_received_listener(
        &self,
        mut callback: impl FnMut(&HashMap<K, V>) + Send + 'static,
    ) -> SubscriptionId {
        let mut state = self.inner.state.lock();
        if state.gate.is_received() {
            callback(&state.backing);
        }
        let id = SubscriptionId::next();
        state.batch_listeners.push((id, Box::new(callback)));
        id
    }

    /// Remove a batch callback. Returns whether it was present.
    pub fn rem_received_listener(&self, id: SubscriptionId) -> bool {
        let mut state = self.inner.state.lock();
        let before = state.batch_listeners.len();
        state.batch_listeners.retain(|(sid, _)| *sid != id);
        state.batch_listeners.len() != before
    }

    /// Give up on ever receiving data: moves an unset gate to the
    /// cancelled state and wakes every blocked `wait_data`, which then
    /// return [`HolderError::WaitCancelled`]. No-op once the gate has
    /// settled either way.
    pub fn cancel(&self) {
        let mut state = self.inner.state.lock();
        if state.gate == Gate::Unset {
            state.gate = Gate::Cancelled;
            self.inner.gate_cond.notify_all();
        }
    }

    // -----------------------------------------------------------------------
    // Producer surface
    // -----------------------------------------------------------------------

    /// Insert or replace an entry, notifying live listeners with an
    /// `added` or `updated` event. Returns the displaced value, if any.
    pub fn put(&self, key: K, value: V) -> Option<V> {
        let mut state = self.inner.state.lock();
        let old = state.backing.insert(key.clone(), value.clone());
        let change = match &old {
            None => MapChange::added(key, value),
            Some(previous) => MapChange::updated(key, previous.clone(), value),
        };
        state.notify_live(&change);
        old
    }

    /// Remove an entry, notifying live listeners with a `removed` event
    /// if the key was present. Returns the removed value.
    pub fn remove(&self, key: &K) -> Option<V> {
        let mut state = self.inner.state.lock();
        match state.backing.remove(key) {
            Some(old) => {
                let change = MapChange::removed(key.clone(), old.clone());
                state.notify_live(&change);
                Some(old)
            }
            None => None,
        }
    }

    /// Insert every entry of `entries`, firing one live event per entry.
    pub fn put_all(&self, entries: impl IntoIterator<Item = (K, V)>) {
        let mut state = self.inner.state.lock();
        for (key, value) in entries {
            let old = state.backing.insert(key.clone(), value.clone());
            let change = match old {
                None => MapChange::added(key, value),
                Some(previous) => MapChange::updated(key, previous, value),
            };
            state.notify_live(&change);
        }
    }

    /// Remove every entry, firing one `removed` event per entry.
    pub fn clear(&self) {
        let mut state = self.inner.state.lock();
        let drained: Vec<(K, V)> = state.backing.drain().collect();
        for (key, value) in drained {
            state.notify_live(&MapChange::removed(key, value));
        }
    }

    // -----------------------------------------------------------------------
    // Upstream wiring (derivations)
    // -----------------------------------------------------------------------

    /// Record a teardown closure for wiring this holder owns on a
    /// source holder.
    pub(crate) fn record_upstream(&self, unsubscribe: Unsubscribe) {
        self.inner.state.lock().upstream.push(unsubscribe);
    }

    /// Sever the wiring a derivation installed on this holder's source:
    /// after this returns, no further source changes or batch signals
    /// propagate here. No-op on holders with no upstream.
    ///
    /// Dropping the last user handle on a derived holder does *not*
    /// disconnect it; the source's registries keep the wiring alive
    /// until `disconnect` is called or the source itself is dropped.
    pub fn disconnect(&self) {
        // Drain under our lock, then run the teardowns lock-free: they
        // acquire the source's lock, and lock order is source before
        // target everywhere.
        let upstream: Vec<Unsubscribe> = {
            let mut state = self.inner.state.lock();
            std::mem::take(&mut state.upstream)
        };
        for unsubscribe in upstream {
            unsubscribe();
        }
    }
}

// ---------------------------------------------------------------------------
// MapObservable
// ---------------------------------------------------------------------------

/// Subscription capability for a holder's raw mutation events.
///
/// Obtained from [`MapHolder::as_observable`]. Unlike
/// [`follow`](MapHolder::follow) there is no historical replay, and the
/// feed is independent of the received gate. The same "no callbacks into
/// the holder" rule applies.
pub struct MapObservable<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for MapObservable<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> MapObservable<K, V> {
    /// Register `listener` for future mutation events only.
    pub fn subscribe(
        &self,
        listener: impl FnMut(&MapChange<K, V>) + Send + 'static,
    ) -> SubscriptionId {
        let mut state = self.inner.state.lock();
        let id = SubscriptionId::next();
        state.live_listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a listener registered on this observable (or via
    /// `follow`). Returns whether it was present.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = self.inner.state.lock();
        let before = state.live_listeners.len();
        state.live_listeners.retain(|(sid, _)| *sid != id);
        state.live_listeners.len() != before
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::Duration;

    fn collect_changes<K, V>(
        sink: &Arc<Mutex<Vec<MapChange<K, V>>>>,
    ) -> impl FnMut(&MapChange<K, V>) + Send + 'static
    where
        K: Clone + Send + 'static,
        V: Clone + Send + 'static,
    {
        let sink = Arc::clone(sink);
        move |change| sink.lock().push(change.clone())
    }

    #[test]
    fn test_prefilled_reads_immediately() {
        let mut initial = HashMap::new();
        initial.insert("a", 1);
        let holder = MapHolder::prefilled(initial);

        assert!(holder.has_data());
        assert_eq!(holder.get(&"a").unwrap(), Some(1));
        assert_eq!(holder.get(&"b").unwrap(), None);
    }

    #[test]
    fn test_wait_data_blocks_until_received() {
        let holder: MapHolder<&str, i32> = MapHolder::new();
        let returned = Arc::new(AtomicBool::new(false));

        let h = holder.clone();
        let flag = Arc::clone(&returned);
        let waiter = thread::spawn(move || {
            let result = h.wait_data();
            flag.store(true, Ordering::SeqCst);
            result
        });

        thread::sleep(Duration::from_millis(100));
        assert!(!returned.load(Ordering::SeqCst));

        holder.put("a", 1);
        holder.data_received();
        assert!(waiter.join().unwrap().is_ok());
        assert!(returned.load(Ordering::SeqCst));
    }

    #[test]
    fn test_gate_monotonic() {
        let holder: MapHolder<&str, i32> = MapHolder::new();
        holder.data_received();

        // Repeatable for the same caller and immediate for new ones.
        assert!(holder.wait_data().is_ok());
        assert!(holder.wait_data().is_ok());

        let h = holder.clone();
        let late = thread::spawn(move || h.wait_data());
        assert!(late.join().unwrap().is_ok());
    }

    #[test]
    fn test_copy_snapshot_isolation() {
        let holder: MapHolder<&str, i32> = MapHolder::new();
        holder.put("a", 1);
        holder.data_received();

        let snapshot = holder.copy().unwrap();
        holder.put("b", 2);
        holder.put("a", 10);

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.get("a"), Some(&1));
        assert_eq!(holder.get(&"a").unwrap(), Some(10));
    }

    #[test]
    fn test_follow_replays_then_streams() {
        let holder: MapHolder<&str, i32> = MapHolder::new();
        holder.put("a", 1);
        holder.put("b", 2);

        let seen = Arc::new(Mutex::new(Vec::new()));
        holder.follow(collect_changes(&seen));
        holder.put("c", 3);

        let events = seen.lock();
        assert_eq!(events.len(), 3);
        // Replay order within the snapshot is unspecified, but replay
        // strictly precedes the live stream.
        let replayed: HashSet<&str> = events[..2].iter().map(|c| *c.key()).collect();
        assert_eq!(replayed, HashSet::from(["a", "b"]));
        assert!(events[..2].iter().all(|c| c.was_added()));
        assert_eq!(events[2].key(), &"c");
        assert_eq!(events[2].new_value(), Some(&3));
    }

    #[test]
    fn test_follow_completeness_under_concurrent_mutation() {
        const WRITERS: usize = 4;
        const KEYS_PER_WRITER: usize = 50;

        let holder: MapHolder<usize, usize> = MapHolder::new();

        let mut writers = Vec::new();
        for w in 0..WRITERS {
            let h = holder.clone();
            writers.push(thread::spawn(move || {
                for i in 0..KEYS_PER_WRITER {
                    h.put(w * 1000 + i, i);
                    if i % 16 == 0 {
                        thread::yield_now();
                    }
                }
            }));
        }

        // Register mid-flight: replay plus live stream must cover every
        // key exactly once.
        thread::sleep(Duration::from_millis(5));
        let seen = Arc::new(Mutex::new(HashSet::new()));
        let duplicates = Arc::new(AtomicBool::new(false));
        {
            let seen = Arc::clone(&seen);
            let duplicates = Arc::clone(&duplicates);
            holder.follow(move |change| {
                if !seen.lock().insert(*change.key()) {
                    duplicates.store(true, Ordering::SeqCst);
                }
            });
        }

        for writer in writers {
            writer.join().unwrap();
        }

        assert!(!duplicates.load(Ordering::SeqCst));
        assert_eq!(seen.lock().len(), WRITERS * KEYS_PER_WRITER);
    }

    #[test]
    fn test_unfollow_stops_delivery() {
        let holder: MapHolder<&str, i32> = MapHolder::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let id = holder.follow(collect_changes(&seen));

        holder.put("a", 1);
        assert!(holder.unfollow(id));
        assert!(!holder.unfollow(id));
        holder.put("b", 2);

        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_data_received_idempotent() {
        let holder: MapHolder<&str, i32> = MapHolder::new();
        holder.put("a", 1);

        let snapshots = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&snapshots);
        holder.add_received_listener(move |map| sink.lock().push(map.clone()));

        holder.data_received();
        holder.data_received();

        let snapshots = snapshots.lock();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0], snapshots[1]);
        assert!(holder.has_data());
    }

    #[test]
    fn test_received_listener_immediate_when_populated() {
        let holder: MapHolder<&str, i32> = MapHolder::new();
        holder.put("a", 1);
        holder.data_received();

        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        holder.add_received_listener(move |map| sink.lock().push(map.len()));

        // Invoked synchronously during registration.
        assert_eq!(calls.lock().as_slice(), &[1]);

        holder.put("b", 2);
        holder.data_received();
        assert_eq!(calls.lock().as_slice(), &[1, 2]);
    }

    #[test]
    fn test_rem_received_listener() {
        let holder: MapHolder<&str, i32> = MapHolder::new();
        let calls = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&calls);
        let id = holder.add_received_listener(move |_| *sink.lock() += 1);

        holder.data_received();
        assert!(holder.rem_received_listener(id));
        assert!(!holder.rem_received_listener(id));
        holder.data_received();

        assert_eq!(*calls.lock(), 1);
    }

    #[test]
    fn test_cancel_wakes_all_waiters() {
        let holder: MapHolder<&str, i32> = MapHolder::new();

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let h = holder.clone();
                thread::spawn(move || h.wait_data())
            })
            .collect();

        thread::sleep(Duration::from_millis(50));
        holder.cancel();

        for waiter in waiters {
            assert_eq!(waiter.join().unwrap(), Err(HolderError::WaitCancelled));
        }
        // Late readers observe the cancellation too.
        assert_eq!(holder.get(&"a"), Err(HolderError::WaitCancelled));
        assert!(holder.copy().is_err());
    }

    #[test]
    fn test_cancel_after_received_is_noop() {
        let holder: MapHolder<&str, i32> = MapHolder::new();
        holder.data_received();
        holder.cancel();
        assert!(holder.wait_data().is_ok());
    }

    #[test]
    fn test_put_remove_event_shapes() {
        let holder: MapHolder<&str, i32> = MapHolder::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        holder.follow(collect_changes(&seen));

        assert_eq!(holder.put("a", 1), None);
        assert_eq!(holder.put("a", 2), Some(1));
        assert_eq!(holder.remove(&"a"), Some(2));
        assert_eq!(holder.remove(&"a"), None);

        let events = seen.lock();
        assert_eq!(events.len(), 3);
        assert!(events[0].was_added() && !events[0].was_removed());
        assert!(events[1].is_update());
        assert_eq!(events[1].old_value(), Some(&1));
        assert!(events[2].is_pure_removal());
        assert_eq!(events[2].old_value(), Some(&2));
    }

    #[test]
    fn test_clear_emits_removals() {
        let holder: MapHolder<&str, i32> = MapHolder::new();
        holder.put_all([("a", 1), ("b", 2)]);

        let seen = Arc::new(Mutex::new(Vec::new()));
        holder.as_observable().subscribe(collect_changes(&seen));
        holder.clear();

        let events = seen.lock();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|c| c.is_pure_removal()));
        assert!(holder.is_empty());
    }

    #[test]
    fn test_observable_is_ungated_and_skips_replay() {
        let holder: MapHolder<&str, i32> = MapHolder::new();
        holder.put("a", 1);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let observable = holder.as_observable();
        let id = observable.subscribe(collect_changes(&seen));

        // No replay of the existing entry, and no gate involved.
        assert!(seen.lock().is_empty());
        holder.put("b", 2);
        assert_eq!(seen.lock().len(), 1);

        assert!(observable.unsubscribe(id));
        holder.put("c", 3);
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_empty_batch_unblocks_consumers() {
        let holder: MapHolder<&str, i32> = MapHolder::new();
        let h = holder.clone();
        let waiter = thread::spawn(move || h.copy());

        // "No data available" is still an answer.
        thread::sleep(Duration::from_millis(20));
        holder.data_received();

        assert!(waiter.join().unwrap().unwrap().is_empty());
    }
}
