#![forbid(unsafe_code)]

pub mod backoff;
pub mod ttl;

pub use backoff::backoff_delay;
pub use ttl::{TtlCounter, TtlSet};
