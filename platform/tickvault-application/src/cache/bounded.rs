use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub(crate) struct Entry<T> {
    pub value: T,
    pub stored_at: Instant,
    pub ttl: Option<Duration>,
}

impl<T> Entry<T> {
    pub fn new(value: T, ttl: Option<Duration>) -> Self {
        Self {
            value,
            stored_at: Instant::now(),
            ttl,
        }
    }

    pub fn is_live(&self, now: Instant) -> bool {
        match self.ttl {
            None => true,
            Some(ttl) => now.saturating_duration_since(self.stored_at) < ttl,
        }
    }
}

/// String-keyed map that evicts the least recently inserted key once it
/// grows past `capacity`.
#[derive(Debug)]
pub(crate) struct BoundedMap<T> {
    entries: HashMap<String, Entry<T>>,
    order: VecDeque<String>,
    capacity: usize,
}

impl<T> BoundedMap<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Returns the entry if still live; expired entries are dropped here.
    pub fn get_live(&mut self, key: &str, now: Instant) -> Option<&T> {
        let live = self.entries.get(key)?.is_live(now);
        if !live {
            self.remove(key);
            return None;
        }
        self.entries.get(key).map(|entry| &entry.value)
    }

    /// Inserts `entry` and returns how many keys were evicted to make room.
    pub fn insert(&mut self, key: String, entry: Entry<T>) -> usize {
        if self.entries.insert(key.clone(), entry).is_some() {
            self.order.retain(|existing| existing != &key);
        }
        self.order.push_back(key);

        let mut evicted = 0;
        while self.entries.len() > self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if self.entries.remove(&oldest).is_some() {
                evicted += 1;
            }
        }
        evicted
    }

    pub fn remove(&mut self, key: &str) -> bool {
        if self.entries.remove(key).is_none() {
            return false;
        }
        self.order.retain(|existing| existing != key);
        true
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn live_len(&self, now: Instant) -> usize {
        self.entries
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::{BoundedMap, Entry};
    use std::time::Duration;
    use tokio::time::Instant;

    #[test]
    fn evicts_least_recently_inserted() {
        let mut map = BoundedMap::new(2);
        map.insert("a".to_string(), Entry::new(1, None));
        map.insert("b".to_string(), Entry::new(2, None));
        map.insert("a".to_string(), Entry::new(3, None));
        let evicted = map.insert("c".to_string(), Entry::new(4, None));

        let now = Instant::now();
        assert_eq!(evicted, 1);
        assert!(map.get_live("b", now).is_none());
        assert_eq!(map.get_live("a", now), Some(&3));
        assert_eq!(map.get_live("c", now), Some(&4));
    }

    #[test]
    fn zero_ttl_entries_are_never_live() {
        let mut map = BoundedMap::new(4);
        map.insert("a".to_string(), Entry::new(1, Some(Duration::ZERO)));
        assert!(map.get_live("a", Instant::now()).is_none());
        assert_eq!(map.live_len(Instant::now()), 0);
    }
}
