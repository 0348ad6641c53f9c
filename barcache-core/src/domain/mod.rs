//! Domain types: bars, cache keys and cached series.

pub mod bar;
pub mod entry;
pub mod key;

pub use bar::{date_of_ms, day_start_ms, Bar};
pub use entry::CacheEntry;
pub use key::{CacheKey, InvalidSymbol, Timespan};
