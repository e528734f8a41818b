//! Timestamped keyed cache

use covenant_core::{Clock, SystemClock, Timestamp};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Stored value with the time it was written
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub value: String,
    pub timestamp: Timestamp,
}

/// Key canonicalisation applied on write
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum KeyCase {
    /// Upper-case section and key
    #[default]
    Insensitive,
    /// Store section and key exactly as given
    Sensitive,
}

/// The cache contract consumed by the commitment engine.
///
/// Every operation is atomic with respect to a single entry. Read-modify-write
/// sequences must go through `update`.
pub trait KeyedCache: Send + Sync {
    /// Store `value`. Empty section or key is a no-op.
    fn write(&self, section: &str, key: &str, value: &str, timestamp: Timestamp, case: KeyCase);

    /// Entry under the upper-cased `(section, key)`
    fn read(&self, section: &str, key: &str) -> Option<CacheEntry>;

    /// Entry under `(section, key)` exactly as given
    fn read_exact(&self, section: &str, key: &str) -> Option<CacheEntry>;

    /// Value, or `None` when missing or older than `max_age` seconds
    fn read_with_max_age(&self, section: &str, key: &str, max_age: i64) -> Option<String>;

    /// Overwrite every entry in `section`, in any case, with an empty value
    fn clear_section(&self, section: &str);

    /// Seconds since the entry was written. `Some(0)` for non-expiring entries.
    fn entry_age(&self, section: &str, key: &str) -> Option<i64>;

    /// Non-empty entries of `section`, sorted by key
    fn section_entries(&self, section: &str) -> Vec<(String, CacheEntry)>;

    /// Atomically replace the value under the upper-cased key with
    /// `f(current)`, where `current` is empty when the entry is missing.
    fn update(
        &self,
        section: &str,
        key: &str,
        timestamp: Timestamp,
        f: &mut dyn FnMut(&str) -> String,
    );

    /// Every `(section, key, entry)`, sorted
    fn entries(&self) -> Vec<(String, String, CacheEntry)>;

    /// Convenience: value or empty string
    fn read_value(&self, section: &str, key: &str) -> String {
        self.read(section, key).map(|e| e.value).unwrap_or_default()
    }
}

fn canonical(section: &str, key: &str) -> (String, String) {
    (section.to_uppercase(), key.to_uppercase())
}

/// Section names match whatever case they were written with
fn same_section(stored: &str, section: &str) -> bool {
    stored.eq_ignore_ascii_case(section)
}

/// Concurrent in-memory cache backed by one `RwLock<HashMap>`
pub struct ApplicationCache {
    entries: RwLock<HashMap<(String, String), CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl ApplicationCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn age_of(&self, entry: &CacheEntry) -> i64 {
        if entry.timestamp == 0 {
            0
        } else {
            self.clock.now() - entry.timestamp
        }
    }
}

impl Default for ApplicationCache {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl KeyedCache for ApplicationCache {
    fn write(&self, section: &str, key: &str, value: &str, timestamp: Timestamp, case: KeyCase) {
        if section.is_empty() || key.is_empty() {
            return;
        }
        let id = match case {
            KeyCase::Insensitive => canonical(section, key),
            KeyCase::Sensitive => (section.to_string(), key.to_string()),
        };
        self.entries.write().insert(
            id,
            CacheEntry {
                value: value.to_string(),
                timestamp,
            },
        );
    }

    fn read(&self, section: &str, key: &str) -> Option<CacheEntry> {
        if section.is_empty() || key.is_empty() {
            return None;
        }
        self.entries.read().get(&canonical(section, key)).cloned()
    }

    fn read_exact(&self, section: &str, key: &str) -> Option<CacheEntry> {
        self.entries
            .read()
            .get(&(section.to_string(), key.to_string()))
            .cloned()
    }

    fn read_with_max_age(&self, section: &str, key: &str, max_age: i64) -> Option<String> {
        let entry = self.read(section, key)?;
        if self.age_of(&entry) > max_age {
            return None;
        }
        Some(entry.value)
    }

    fn clear_section(&self, section: &str) {
        let mut entries = self.entries.write();
        for ((entry_section, _), entry) in entries.iter_mut() {
            if same_section(entry_section, section) {
                *entry = CacheEntry::default();
            }
        }
    }

    fn entry_age(&self, section: &str, key: &str) -> Option<i64> {
        self.read(section, key).map(|entry| self.age_of(&entry))
    }

    fn section_entries(&self, section: &str) -> Vec<(String, CacheEntry)> {
        let mut found: Vec<(String, CacheEntry)> = self
            .entries
            .read()
            .iter()
            .filter(|((s, _), e)| same_section(s, section) && !e.value.is_empty())
            .map(|((_, k), e)| (k.clone(), e.clone()))
            .collect();
        found.sort_by(|a, b| a.0.cmp(&b.0));
        found
    }

    fn update(
        &self,
        section: &str,
        key: &str,
        timestamp: Timestamp,
        f: &mut dyn FnMut(&str) -> String,
    ) {
        if section.is_empty() || key.is_empty() {
            return;
        }
        let mut entries = self.entries.write();
        let slot = entries.entry(canonical(section, key)).or_default();
        slot.value = f(&slot.value);
        slot.timestamp = timestamp;
    }

    fn entries(&self) -> Vec<(String, String, CacheEntry)> {
        let mut all: Vec<(String, String, CacheEntry)> = self
            .entries
            .read()
            .iter()
            .map(|((s, k), e)| (s.clone(), k.clone(), e.clone()))
            .collect();
        all.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use covenant_core::ManualClock;

    fn cache_at(now: Timestamp) -> (ApplicationCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(now));
        (ApplicationCache::new(clock.clone()), clock)
    }

    #[test]
    fn test_write_read_ignores_case() {
        let (cache, _) = cache_at(1_000);
        cache.write("dws-burn", "abc", "100", 900, KeyCase::Insensitive);
        assert_eq!(cache.read_value("DWS-BURN", "ABC"), "100");
        assert_eq!(cache.read_value("Dws-Burn", "aBc"), "100");
    }

    #[test]
    fn test_empty_section_or_key_is_noop() {
        let (cache, _) = cache_at(1_000);
        cache.write("", "k", "v", 1, KeyCase::Insensitive);
        cache.write("s", "", "v", 1, KeyCase::Insensitive);
        assert!(cache.is_empty());
        assert!(cache.read("", "k").is_none());
    }

    #[test]
    fn test_case_sensitive_write() {
        let (cache, _) = cache_at(1_000);
        cache.write("ADDR", "BxYz", "1", 1, KeyCase::Sensitive);
        assert!(cache.read("ADDR", "BxYz").is_none());
        assert_eq!(cache.read_exact("ADDR", "BxYz").map(|e| e.value), Some("1".into()));
        assert_eq!(cache.section_entries("addr")[0].0, "BxYz");
    }

    #[test]
    fn test_last_write_wins() {
        let (cache, _) = cache_at(1_000);
        cache.write("s", "k", "first", 10, KeyCase::Insensitive);
        cache.write("s", "k", "second", 20, KeyCase::Insensitive);
        let entry = cache.read("s", "k").unwrap();
        assert_eq!(entry.value, "second");
        assert_eq!(entry.timestamp, 20);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_max_age() {
        let (cache, clock) = cache_at(1_000);
        cache.write("price", "btc", "42000", 1_000, KeyCase::Insensitive);
        cache.write("forever", "k", "v", 0, KeyCase::Insensitive);

        clock.advance(3_600);
        assert_eq!(cache.entry_age("price", "btc"), Some(3_600));
        assert_eq!(cache.read_with_max_age("price", "btc", 3_600), Some("42000".into()));
        clock.advance(1);
        assert_eq!(cache.read_with_max_age("price", "btc", 3_600), None);

        clock.advance(1_000_000);
        assert_eq!(cache.entry_age("forever", "k"), Some(0));
        assert_eq!(cache.read_with_max_age("forever", "k", 1), Some("v".into()));
        assert_eq!(cache.entry_age("missing", "k"), None);
    }

    #[test]
    fn test_clear_section_blanks_entries() {
        let (cache, _) = cache_at(1_000);
        cache.write("votes", "a", "1", 5, KeyCase::Insensitive);
        cache.write("votes", "b", "2", 5, KeyCase::Insensitive);
        cache.write("other", "a", "3", 5, KeyCase::Insensitive);
        cache.clear_section("Votes");

        assert_eq!(cache.read("votes", "a"), Some(CacheEntry::default()));
        assert!(cache.section_entries("votes").is_empty());
        assert_eq!(cache.read_value("other", "a"), "3");
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_clear_section_reaches_case_sensitive_writes() {
        let (cache, _) = cache_at(1_000);
        cache.write("Addr", "BxYz", "1", 5, KeyCase::Sensitive);
        cache.write("addr", "k", "2", 5, KeyCase::Insensitive);
        assert_eq!(cache.section_entries("ADDR").len(), 2);

        cache.clear_section("addr");
        assert_eq!(cache.read_exact("Addr", "BxYz"), Some(CacheEntry::default()));
        assert_eq!(cache.read("ADDR", "K"), Some(CacheEntry::default()));
        assert!(cache.section_entries("Addr").is_empty());
    }

    #[test]
    fn test_update_accumulates() {
        let (cache, _) = cache_at(1_000);
        for _ in 0..3 {
            cache.update("count", "gobj", 7, &mut |current| {
                let n: i64 = current.parse().unwrap_or(0);
                (n + 1).to_string()
            });
        }
        assert_eq!(cache.read_value("COUNT", "GOBJ"), "3");
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let (cache, _) = cache_at(1_000);
        let cache = Arc::new(cache);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        cache.update("s", "k", 1, &mut |current| {
                            (current.parse::<i64>().unwrap_or(0) + 1).to_string()
                        });
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.read_value("s", "k"), "800");
    }

    #[test]
    fn test_section_entries_sorted() {
        let (cache, _) = cache_at(1_000);
        cache.write("s", "b", "2", 1, KeyCase::Insensitive);
        cache.write("s", "a", "1", 1, KeyCase::Insensitive);
        let keys: Vec<String> = cache.section_entries("s").into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["A".to_string(), "B".to_string()]);
    }
}
