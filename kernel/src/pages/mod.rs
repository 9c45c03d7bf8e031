// Page cache: the slot ring with its navigation cursor, and the worker
// that fills it from the network.

pub mod prefetch;
pub mod store;

pub use prefetch::{FetchIntent, PageSource, PrefetchWorker};
pub use store::{Advanced, Cursor, Direction, PageBuffer, PageNumber, PageStore, ResidentPage, slot_of};
