//! The Robin-Hood hash table family (§3, §4.1-§4.5): one generic probing
//! engine (`robinhood`) over a hand-laid-out allocation (`layout`),
//! specialized four ways for the key/value shapes the embedding VM needs.

mod layout;
mod robinhood;

pub mod fixkey_hash;
pub mod index_hash;
pub mod ptr_hash;
pub mod uni_hash;

pub use fixkey_hash::{FixKeyHash, FixKeyRecord};
pub use index_hash::IndexHash;
pub use ptr_hash::PtrHash;
pub use uni_hash::{UniHash, UniKey};
