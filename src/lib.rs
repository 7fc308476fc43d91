//! # collection-holders
//!
//! Concurrency primitives for sharing a mutable, incrementally updated
//! collection between one producer and many consumers.
//!
//! A [`MapHolder`] (or [`ListHolder`]) wraps a collection together with
//! its synchronization and notification machinery:
//!
//! - a **received gate**: consumers can block until the producer has
//!   delivered at least one complete batch ([`MapHolder::wait_data`],
//!   and the gated reads [`MapHolder::get`] / [`MapHolder::copy`]);
//! - a **live change feed**: [`MapHolder::follow`] atomically replays
//!   the current contents and subscribes to every future element-level
//!   change, with no gaps and no duplicates under concurrent mutation;
//! - **batch callbacks**: [`MapHolder::add_received_listener`] runs once
//!   per completed batch with a snapshot, and immediately if data has
//!   already arrived.
//!
//! Derived holders ([`map_values`], [`from_sequence`]) are pure
//! functions of a source holder: every change and every batch signal on
//! the source is translated and re-emitted on the target, so the gate
//! and feed guarantees hold transitively.
//!
//! All state of one holder is guarded by a single lock, and listeners
//! run while it is held: delivery order matches mutation order, and in
//! exchange listeners must be quick and must never call back into the
//! holder that invoked them.
//!
//! ```
//! use collection_holders::{map_values, MapHolder};
//!
//! let inventory: MapHolder<String, u32> = MapHolder::new();
//! let doubled = map_values(&inventory, |n| n * 2);
//!
//! inventory.put("bolts".to_string(), 40);
//! inventory.data_received();
//!
//! assert_eq!(doubled.get(&"bolts".to_string()).unwrap(), Some(80));
//! ```

pub mod error;
pub mod holder;

pub use error::{HolderError, TransformError};
pub use holder::change::{MapChange, SeqChange};
pub use holder::derive::{from_sequence, from_sequence_mapped, map_values, try_map_values};
pub use holder::list_holder::ListHolder;
pub use holder::map_holder::{MapHolder, MapObservable};
pub use holder::SubscriptionId;
