//! Items offered for swapping.

mod item;

pub use item::{Item, ItemSummary, NewItem};
