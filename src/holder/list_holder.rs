//! Synchronized holder around a mutable ordered sequence.
//!
//! The sequence-side counterpart of [`MapHolder`](super::MapHolder),
//! with the same gate/notification contract. Live listeners receive
//! batched [`SeqChange`] notifications rather than per-element events: a
//! producer groups related removals and additions into one notification,
//! and consumers apply removals before additions.
//!
//! The same locking rule applies: one mutex per holder, listeners run
//! under it, and a listener must not call back into the holder it is
//! registered on.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::error::HolderError;
use crate::holder::change::SeqChange;
use crate::holder::gate::Gate;
use crate::holder::subscription::SubscriptionId;

type LiveListener<V> = Box<dyn FnMut(&SeqChange<V>) + Send>;
type BatchListener<V> = Box<dyn FnMut(&[V]) + Send>;

struct State<V> {
    backing: Vec<V>,
    gate: Gate,
    live_listeners: Vec<(SubscriptionId, LiveListener<V>)>,
    batch_listeners: Vec<(SubscriptionId, BatchListener<V>)>,
}

impl<V> State<V> {
    fn notify_live(&mut self, change: &SeqChange<V>) {
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
            callback(backing.as_slice());
        }
    }
}

struct Inner<V> {
    state: Mutex<State<V>>,
    gate_cond: Condvar,
}

/// Shared, synchronized holder of a mutable ordered sequence of `V`.
///
/// Cloning is cheap and yields another handle on the same holder.
pub struct ListHolder<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for ListHolder<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> fmt::Debug for ListHolder<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.state.try_lock() {
            Some(state) => f
                .debug_struct("ListHolder")
                .field("len", &state.backing.len())
                .field("gate", &state.gate)
                .finish_non_exhaustive(),
            None => write!(f, "ListHolder {{ <locked> }}"),
        }
    }
}

impl<V> Default for ListHolder<V>
where
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V> ListHolder<V>
where
    V: Clone,
{
    /// Create an empty, unpopulated holder.
    pub fn new() -> Self {
        Self::with_gate(Vec::new(), Gate::Unset)
    }

    /// Create a holder already populated with `backing`; the gate is set.
    pub fn prefilled(backing: Vec<V>) -> Self {
        Self::with_gate(backing, Gate::Received)
    }

    fn with_gate(backing: Vec<V>, gate: Gate) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    backing,
                    gate,
                    live_listeners: Vec::new(),
                    batch_listeners: Vec::new(),
                }),
                gate_cond: Condvar::new(),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Gated reads
    // -----------------------------------------------------------------------

    /// Block until the first complete batch has arrived; see
    /// [`MapHolder::wait_data`](super::MapHolder::wait_data).
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

    /// Wait for the first batch, then return an independent snapshot.
    pub fn copy(&self) -> Result<Vec<V>, HolderError> {
        self.wait_data()?;
        let state = self.inner.state.lock();
        Ok(state.backing.clone())
    }

    /// Number of elements currently held. Not gated.
    pub fn len(&self) -> usize {
        self.inner.state.lock().backing.len()
    }

    /// Whether the sequence is currently empty. Not gated.
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

    /// Replay the current contents to `listener` as one synthetic
    /// all-additions batch, then register it for all future batches.
    /// Replay and registration share one lock acquisition, so no batch
    /// is missed or double-delivered.
    pub fn follow(
        &self,
        mut listener: impl FnMut(&SeqChange<V>) + Send + 'static,
    ) -> SubscriptionId {
        let mut state = self.inner.state.lock();
        if !state.backing.is_empty() {
            let replay = SeqChange::additions(state.backing.clone());
            listener(&replay);
        }
        let id = SubscriptionId::next();
        state.live_listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a listener registered via [`follow`](Self::follow).
    /// Returns whether it was present.
    pub fn unfollow(&self, id: SubscriptionId) -> bool {
        let mut state = self.inner.state.lock();
        let before = state.live_listeners.len();
        state.live_listeners.retain(|(sid, _)| *sid != id);
        state.live_listeners.len() != before
    }

    // -----------------------------------------------------------------------
    // Batch lifecycle
    // -----------------------------------------------------------------------

    /// Declare the current batch complete; same semantics as
    /// [`MapHolder::data_received`](super::MapHolder::data_received).
    pub fn data_received(&self) {
        let mut state = self.inner.state.lock();
        if state.gate == Gate::Unset {
            state.gate = Gate::Received;
            self.inner.gate_cond.notify_all();
        }
        state.notify_batch();
    }

    /// Register a per-batch snapshot callback; invoked immediately if
    /// the gate is already set.
    pub fn add_received_listener(
        &self,
        mut callback: impl FnMut(&[V]) + Send + 'static,
    ) -> SubscriptionId {
        let mut state = self.inner.state.lock();
        if state.gate.is_received() {
            callback(state.backing.as_slice());
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

    /// Cancel waiting; see [`MapHolder::cancel`](super::MapHolder::cancel).
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

    /// Append one element, notifying live listeners with a one-addition
    /// batch.
    pub fn push(&self, value: V) {
        let mut state = self.inner.state.lock();
        state.backing.push(value.clone());
        let change = SeqChange::additions(vec![value]);
        state.notify_live(&change);
    }

    /// Append several elements as one addition batch.
    pub fn extend(&self, items: impl IntoIterator<Item = V>) {
        let added: Vec<V> = items.into_iter().collect();
        if added.is_empty() {
            return;
        }
        let mut state = self.inner.state.lock();
        state.backing.extend(added.iter().cloned());
        let change = SeqChange::additions(added);
        state.notify_live(&change);
    }

    /// Remove the first occurrence of `value`, notifying live listeners
    /// with a one-removal batch. Returns whether anything was removed.
    pub fn remove_value(&self, value: &V) -> bool
    where
        V: PartialEq,
    {
        let mut state = self.inner.state.lock();
        match state.backing.iter().position(|v| v == value) {
            Some(pos) => {
                let old = state.backing.remove(pos);
                let change = SeqChange::removals(vec![old]);
                state.notify_live(&change);
                true
            }
            None => false,
        }
    }

    /// Apply a combined batch: remove the first occurrence of each
    /// removed element, append every added element, then deliver the
    /// whole change as a single notification.
    pub fn apply(&self, change: SeqChange<V>)
    where
        V: PartialEq,
    {
        if change.is_empty() {
            return;
        }
        let mut state = self.inner.state.lock();
        for removed in change.removed() {
            if let Some(pos) = state.backing.iter().position(|v| v == removed) {
                state.backing.remove(pos);
            }
        }
        state.backing.extend(change.added().iter().cloned());
        state.notify_live(&change);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_push_extend_events() {
        let holder: ListHolder<i32> = ListHolder::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        holder.follow(move |batch| sink.lock().push(batch.clone()));

        holder.push(1);
        holder.extend([2, 3]);
        holder.extend(std::iter::empty());

        let batches = seen.lock();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].added(), &[1]);
        assert_eq!(batches[1].added(), &[2, 3]);
    }

    #[test]
    fn test_follow_replays_existing_contents() {
        let holder = ListHolder::prefilled(vec!["a", "b"]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = holder.follow(move |batch| sink.lock().push(batch.clone()));

        holder.push("c");
        assert!(holder.unfollow(id));
        holder.push("d");

        let batches = seen.lock();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].added(), &["a", "b"]);
        assert_eq!(batches[1].added(), &["c"]);
    }

    #[test]
    fn test_remove_value_first_occurrence() {
        let holder = ListHolder::prefilled(vec![1, 2, 1]);
        assert!(holder.remove_value(&1));
        assert_eq!(holder.copy().unwrap(), vec![2, 1]);
        assert!(!holder.remove_value(&9));
    }

    #[test]
    fn test_apply_combined_batch() {
        let holder = ListHolder::prefilled(vec![1, 2]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        follow_collect(&holder, &seen);

        holder.apply(SeqChange::new(vec![1], vec![3, 4]));
        assert_eq!(holder.copy().unwrap(), vec![2, 3, 4]);

        // Replay batch plus the applied batch, delivered as one each.
        let batches = seen.lock();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[1].removed(), &[1]);
        assert_eq!(batches[1].added(), &[3, 4]);
    }

    #[test]
    fn test_gate_and_cancel() {
        let holder: ListHolder<i32> = ListHolder::new();
        let h = holder.clone();
        let waiter = thread::spawn(move || h.wait_data());
        thread::sleep(Duration::from_millis(20));
        holder.data_received();
        assert!(waiter.join().unwrap().is_ok());

        let cancelled: ListHolder<i32> = ListHolder::new();
        cancelled.cancel();
        assert_eq!(cancelled.copy(), Err(HolderError::WaitCancelled));
    }

    #[test]
    fn test_received_listener_immediacy() {
        let holder = ListHolder::prefilled(vec![1, 2, 3]);
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        let id = holder.add_received_listener(move |items| sink.lock().push(items.len()));

        assert_eq!(calls.lock().as_slice(), &[3]);

        holder.push(4);
        holder.data_received();
        assert_eq!(calls.lock().as_slice(), &[3, 4]);

        assert!(holder.rem_received_listener(id));
        holder.data_received();
        assert_eq!(calls.lock().len(), 2);
    }

    fn follow_collect<V: Clone + Send + 'static>(
        holder: &ListHolder<V>,
        sink: &Arc<Mutex<Vec<SeqChange<V>>>>,
    ) {
        let sink = Arc::clone(sink);
        holder.follow(move |batch| sink.lock().push(batch.clone()));
    }
}
