use linked_hash_map::LinkedHashMap;

/// Returns the allocated memory in bytes.
pub trait ByteSize {
    /// Returns the amount of memory occupied by this value in bytes.
    ///
    /// This is used to decide when the store has to evict entries, therefore it should
    /// represent the "largest" part of an instance (e.g. the payload of a buffer) rather than
    /// the few bytes of bookkeeping kept on the stack.
    fn allocated_size(&self) -> usize;
}

impl ByteSize for String {
    fn allocated_size(&self) -> usize {
        self.len()
    }
}

impl ByteSize for Vec<u8> {
    fn allocated_size(&self) -> usize {
        self.len()
    }
}

/// Invoked with the key and value of each entry which is evicted to make room.
pub type EvictionCallback<V> = Box<dyn FnMut(&str, &V) + Send>;

/// Provides a size constrained LRU store.
///
/// The store behaves just like a **Map** as long as there is no shortage in memory. Once the
/// sum of all key and value sizes grows beyond **max_memory**, the least recently used entries
/// are evicted until the store fits again. A **max_memory** of 0 disables eviction entirely.
///
/// # Examples
/// ```
/// # use ganymede::lru::LRUCache;
/// // Specifies a store which can hold up to 16 bytes of keys and values...
/// let mut lru = LRUCache::new(16);
///
/// lru.put("Foo".to_owned(), "Bar".to_owned());
/// assert_eq!(lru.get("Foo").unwrap(), &"Bar".to_owned());
///
/// // this will still fit (6 + 8 bytes)...
/// lru.put("Foo1".to_owned(), "X".repeat(4));
/// assert_eq!(lru.get("Foo").is_some(), true);
/// assert_eq!(lru.get("Foo1").is_some(), true);
///
/// // ..but this won't, so the least recently used entry is thrown out:
/// lru.put("Foo2".to_owned(), "X".repeat(4));
/// assert_eq!(lru.get("Foo").is_some(), false);
/// assert_eq!(lru.get("Foo1").is_some(), true);
/// assert_eq!(lru.get("Foo2").is_some(), true);
///```
pub struct LRUCache<V: ByteSize> {
    allocated_memory: usize,
    max_memory: usize,
    reads: usize,
    hits: usize,
    writes: usize,
    map: LinkedHashMap<String, Entry<V>>,
    on_evicted: Option<EvictionCallback<V>>,
}

struct Entry<V: ByteSize> {
    mem_size: usize,
    value: V,
}

impl<V: ByteSize> LRUCache<V> {
    /// Creates a new store which may occupy up to **max_memory** bytes (0 = unbounded).
    pub fn new(max_memory: usize) -> Self {
        LRUCache {
            allocated_memory: 0,
            max_memory,
            reads: 0,
            hits: 0,
            writes: 0,
            map: LinkedHashMap::new(),
            on_evicted: None,
        }
    }

    /// Creates a new store which invokes the given callback for each evicted entry.
    ///
    /// The callback runs synchronously while the entry is being evicted (and therefore within
    /// any lock held around the store), so it must not block.
    ///
    /// # Examples
    /// ```
    /// # use ganymede::lru::LRUCache;
    /// # use std::sync::{Arc, Mutex};
    /// let evicted = Arc::new(Mutex::new(Vec::new()));
    /// let log = evicted.clone();
    /// let mut lru = LRUCache::with_eviction_callback(
    ///     8,
    ///     Box::new(move |key: &str, _value: &String| log.lock().unwrap().push(key.to_owned())),
    /// );
    ///
    /// lru.put("A".to_owned(), "123".to_owned());
    /// lru.put("B".to_owned(), "123".to_owned());
    /// lru.put("C".to_owned(), "123".to_owned());
    ///
    /// assert_eq!(evicted.lock().unwrap().as_slice(), &["A".to_owned()]);
    /// ```
    pub fn with_eviction_callback(max_memory: usize, on_evicted: EvictionCallback<V>) -> Self {
        let mut cache = LRUCache::new(max_memory);
        cache.on_evicted = Some(on_evicted);
        cache
    }

    /// Stores the given value for the given key.
    ///
    /// An existing entry is updated in place and becomes the most recently used one. Afterwards
    /// entries are evicted from the least recently used end until the store fits into its
    /// memory budget again. Note that an entry which is larger than the whole budget therefore
    /// evicts everything, including itself.
    pub fn put(&mut self, key: String, value: V) {
        self.writes += 1;

        let value_size = value.allocated_size();
        if let Some(entry) = self.map.get_refresh(&key) {
            let key_size = entry.mem_size - entry.value.allocated_size();
            self.allocated_memory = self.allocated_memory - entry.mem_size + key_size + value_size;
            entry.mem_size = key_size + value_size;
            entry.value = value;
        } else {
            let mem_size = key.len() + value_size;
            self.allocated_memory += mem_size;
            let _ = self.map.insert(key, Entry { mem_size, value });
        }

        self.enforce_constraints();
    }

    fn enforce_constraints(&mut self) {
        while self.max_memory > 0 && self.allocated_memory > self.max_memory {
            let Some((key, entry)) = self.map.pop_front() else {
                break;
            };

            self.allocated_memory -= entry.mem_size;
            if let Some(on_evicted) = self.on_evicted.as_mut() {
                on_evicted(&key, &entry.value);
            }
        }
    }

    /// Returns the value which has previously been stored for the given key or **None** if
    /// no value is present.
    ///
    /// A hit marks the entry as most recently used, a miss has no side effects (apart from
    /// the read counter).
    pub fn get(&mut self, key: &str) -> Option<&V> {
        self.reads += 1;

        match self.map.get_refresh(key) {
            Some(entry) => {
                self.hits += 1;
                Some(&entry.value)
            }
            None => None,
        }
    }

    /// Removes the entry for the given key if present.
    ///
    /// Note that this doesn't invoke the eviction callback as the entry wasn't evicted.
    pub fn remove(&mut self, key: &str) -> Option<V> {
        self.writes += 1;

        self.map.remove(key).map(|entry| {
            self.allocated_memory -= entry.mem_size;
            entry.value
        })
    }

    /// Removes all entries in this store and resets all metrics.
    pub fn flush(&mut self) {
        self.map.clear();
        self.allocated_memory = 0;
        self.reads = 0;
        self.writes = 0;
        self.hits = 0;
    }

    /// Returns the number of entries in the store.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Determines if the store is completely empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns the memory budget of this store (0 = unbounded).
    pub fn max_memory(&self) -> usize {
        self.max_memory
    }

    /// Changes the memory budget of this store.
    ///
    /// Shrinking the budget immediately evicts entries until the store fits again.
    ///
    /// # Examples
    /// ```
    /// # use ganymede::lru::LRUCache;
    /// let mut lru = LRUCache::new(0);
    /// for i in 0..6 {
    ///     lru.put(format!("Foo{}", i), "Bar".to_owned());
    /// }
    /// assert_eq!(lru.len(), 6);
    ///
    /// // Each entry occupies 7 bytes, so only the two most recent ones survive...
    /// lru.set_max_memory(14);
    /// assert_eq!(lru.len(), 2);
    /// assert_eq!(lru.get("Foo5").is_some(), true);
    /// ```
    pub fn set_max_memory(&mut self, max_memory: usize) {
        self.max_memory = max_memory;
        self.enforce_constraints();
    }

    /// Returns the number of bytes occupied by all keys and values.
    pub fn allocated_memory(&self) -> usize {
        self.allocated_memory
    }

    /// Returns the hit rate in percent.
    ///
    /// Note that all metrics are reset when **flush()** is called.
    pub fn hit_rate(&self) -> f32 {
        match self.reads {
            0 => 0.,
            n => self.hits as f32 / n as f32 * 100.,
        }
    }

    /// Returns the total number of reads performed on this store since the last flush.
    pub fn reads(&self) -> usize {
        self.reads
    }

    /// Returns the number of reads which found a value since the last flush.
    pub fn hits(&self) -> usize {
        self.hits
    }

    /// Returns the total number of writes performed on this store since the last flush.
    pub fn writes(&self) -> usize {
        self.writes
    }
}

#[cfg(test)]
mod tests {
    use crate::lru::LRUCache;
    use std::sync::{Arc, Mutex};

    #[test]
    fn least_recently_used_entry_is_evicted() {
        // Room for exactly two entries of 2 bytes each...
        let mut lru = LRUCache::new(4);
        lru.put("A".to_owned(), "1".to_owned());
        lru.put("B".to_owned(), "2".to_owned());

        // Touching "A" makes "B" the least recently used entry...
        assert_eq!(lru.get("A").unwrap(), "1");
        lru.put("C".to_owned(), "3".to_owned());

        assert_eq!(lru.get("B"), None);
        assert_eq!(lru.get("A").unwrap(), "1");
        assert_eq!(lru.get("C").unwrap(), "3");
        assert_eq!(lru.len(), 2);
    }

    #[test]
    fn max_memory_is_enforced() {
        let mut lru = LRUCache::new(12 * 4);

        // We expect 4 entries with a size of 12 bytes each to fully fit in the store....
        lru.put("Hello0".to_owned(), "World0".to_owned());
        lru.put("Hello1".to_owned(), "World1".to_owned());
        lru.put("Hello2".to_owned(), "World2".to_owned());
        lru.put("Hello3".to_owned(), "World3".to_owned());
        assert_eq!(lru.len(), 4);
        assert_eq!(lru.allocated_memory(), 12 * 4);

        // If we remove an entry, the used memory is corrected...
        assert_eq!(lru.remove("Hello0").unwrap(), "World0");
        assert_eq!(lru.len(), 3);
        assert_eq!(lru.allocated_memory(), 12 * 3);

        // If we replace an entry, the used memory is corrected...
        lru.put("Hello1".to_owned(), "".to_owned());
        assert_eq!(lru.allocated_memory(), 12 * 3 - 6);

        // Restore the original entry, so that the store has three entries with 12 bytes each...
        lru.put("Hello1".to_owned(), "World1".to_owned());
        assert_eq!(lru.allocated_memory(), 12 * 3);

        // If we now add an entry which is 13 bytes long, one entry has to be dropped...
        lru.put("Hello0".to_owned(), "World01".to_owned());
        assert_eq!(lru.allocated_memory(), 12 * 2 + 13);
        assert_eq!(lru.len(), 3);

        // "Hello2" was the least recently touched/modified, so it was evicted...
        assert_eq!(lru.get("Hello2"), None);
        assert!(lru.allocated_memory() <= lru.max_memory());
    }

    #[test]
    fn zero_max_memory_never_evicts() {
        let mut lru = LRUCache::new(0);
        for i in 0..10_000 {
            lru.put(format!("key-{}", i), "X".repeat(128));
        }

        assert_eq!(lru.len(), 10_000);
        assert_eq!(lru.get("key-0").unwrap().len(), 128);
    }

    #[test]
    fn eviction_callback_is_invoked_once_per_entry() {
        let evicted = Arc::new(Mutex::new(Vec::new()));
        let log = evicted.clone();
        let mut lru = LRUCache::with_eviction_callback(
            10,
            Box::new(move |key: &str, value: &String| {
                log.lock().unwrap().push((key.to_owned(), value.clone()))
            }),
        );

        lru.put("key1".to_owned(), "1".to_owned());
        lru.put("key2".to_owned(), "2".to_owned());
        lru.put("k3".to_owned(), "3".to_owned());
        lru.put("k4".to_owned(), "4".to_owned());

        assert_eq!(
            evicted.lock().unwrap().as_slice(),
            &[
                ("key1".to_owned(), "1".to_owned()),
                ("key2".to_owned(), "2".to_owned())
            ]
        );

        // Explicit removals are not evictions...
        let _ = lru.remove("k3");
        assert_eq!(evicted.lock().unwrap().len(), 2);
    }

    #[test]
    fn oversized_entry_evicts_everything() {
        let mut lru = LRUCache::new(8);
        lru.put("A".to_owned(), "1".to_owned());
        lru.put("B".to_owned(), "X".repeat(16));

        assert_eq!(lru.len(), 0);
        assert_eq!(lru.allocated_memory(), 0);
    }

    #[test]
    fn updating_an_entry_marks_it_as_recently_used() {
        let mut lru = LRUCache::new(6);
        lru.put("A".to_owned(), "1".to_owned());
        lru.put("B".to_owned(), "2".to_owned());
        lru.put("C".to_owned(), "3".to_owned());

        // Update "A" so that "B" becomes the eldest entry...
        lru.put("A".to_owned(), "4".to_owned());
        lru.put("D".to_owned(), "5".to_owned());

        assert_eq!(lru.get("B"), None);
        assert_eq!(lru.get("A").unwrap(), "4");
        assert_eq!(lru.len(), 3);
    }

    #[test]
    fn metrics_are_computed_correctly() {
        let mut lru = LRUCache::new(10);

        lru.put("A".to_owned(), "A".to_owned());
        lru.put("B".to_owned(), "B".to_owned());
        lru.put("C".to_owned(), "C".to_owned());

        // Perform 4 reads, of which 3 hit an entry...
        assert!(lru.get("A").is_some());
        assert!(lru.get("B").is_some());
        assert!(lru.get("C").is_some());
        assert!(lru.get("D").is_none());

        assert_eq!(lru.writes(), 3);
        assert_eq!(lru.reads(), 4);
        assert_eq!(lru.hits(), 3);
        assert_eq!(lru.hit_rate().round() as i32, 75);
        assert_eq!(lru.allocated_memory(), 6);

        lru.flush();
        assert!(lru.is_empty());
        assert_eq!(lru.reads(), 0);
        assert_eq!(lru.allocated_memory(), 0);
    }
}
