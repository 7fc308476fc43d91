//! Observable collection holders and their derivation algebra.
//!
//! - [`MapHolder`]: one producer, many consumers around a keyed
//!   collection, with a one-shot received gate, an element-level change
//!   feed, and per-batch snapshot callbacks.
//! - [`ListHolder`]: the same contract around an ordered sequence, with
//!   batched change notifications.
//! - [`derive`]: constructors for holders that are pure functions of an
//!   existing holder (`map_values`, `from_sequence`).

pub mod change;
pub mod derive;
mod gate;
pub mod list_holder;
pub mod map_holder;
mod subscription;

pub use change::{MapChange, SeqChange};
pub use derive::{from_sequence, from_sequence_mapped, map_values, try_map_values};
pub use list_holder::ListHolder;
pub use map_holder::{MapHolder, MapObservable};
pub use subscription::SubscriptionId;
