//! Reverse `address -> latest-hostname` cache built from observed DNS
//! responses during replay (spec.md §4.2, §9 design notes). Hostname text is
//! appended to one growing buffer; the index only ever holds an
//! `(offset, len)` pair, so a lookup never allocates.

use std::collections::HashMap;

use netmon_events::Address;

#[derive(Default)]
pub struct InvertedCache {
    text: Vec<u8>,
    index: HashMap<Address, (usize, usize)>,
}

impl InvertedCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `addr` was most recently seen resolving to `hostname`.
    /// A repeated address just appends another copy of its text and repoints
    /// the index; the earlier bytes are never reclaimed, which is fine for a
    /// cache that lives only for one reader's lifetime.
    pub fn observe(&mut self, addr: Address, hostname: &str) {
        let offset = self.text.len();
        self.text.extend_from_slice(hostname.as_bytes());
        self.index.insert(addr, (offset, hostname.len()));
    }

    pub fn lookup(&self, addr: &Address) -> Option<&str> {
        let (offset, len) = *self.index.get(addr)?;
        std::str::from_utf8(&self.text[offset..offset + len]).ok()
    }

    pub fn resolve(&self, addr: &Address) -> Option<String> {
        self.lookup(addr).map(str::to_string)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observe_then_lookup() {
        let mut cache = InvertedCache::new();
        cache.observe(Address::V4([93, 184, 216, 34]), "example.com");
        assert_eq!(cache.lookup(&Address::V4([93, 184, 216, 34])), Some("example.com"));
    }

    #[test]
    fn unknown_address_is_none() {
        let cache = InvertedCache::new();
        assert_eq!(cache.lookup(&Address::V4([1, 2, 3, 4])), None);
    }

    #[test]
    fn most_recent_hostname_wins() {
        let mut cache = InvertedCache::new();
        let addr = Address::V4([10, 0, 0, 1]);
        cache.observe(addr, "old.example.com");
        cache.observe(addr, "new.example.com");
        assert_eq!(cache.lookup(&addr), Some("new.example.com"));
    }
}
