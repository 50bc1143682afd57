pub mod inverted_cache;
pub mod message;

pub use inverted_cache::InvertedCache;
pub use message::{parse, DnsMessage};
