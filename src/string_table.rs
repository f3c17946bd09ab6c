use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An append-only pool of interned strings.  Each distinct string is assigned
/// the next dense index the first time it is added and keeps it forever.
///
/// The table is safe to share between threads that are concurrently
/// symbolizing stacks.  It serializes as a plain JSON array of strings where
/// the position is the index.
#[derive(Debug, Default)]
pub struct StringTable {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    strings: Vec<String>,
    /// Lazily (re)built from `strings`.  A table that came out of
    /// deserialization has no index until the first `add`.
    index: Option<HashMap<String, usize>>,
}

impl StringTable {
    pub fn new() -> Self {
        StringTable::default()
    }

    /// Returns the index of `s`, interning it if it is not already present.
    pub fn add(&self, s: &str) -> usize {
        {
            let inner = self.inner.read();
            if let Some(&i) = inner.index.as_ref().and_then(|index| index.get(s)) {
                return i;
            }
        }

        let mut inner = self.inner.write();
        let Inner { strings, index } = &mut *inner;
        let index = index.get_or_insert_with(|| {
            strings
                .iter()
                .enumerate()
                .map(|(i, s)| (s.clone(), i))
                .collect()
        });
        // Someone may have beaten us to it between dropping the read lock and
        // acquiring the write lock.
        if let Some(&i) = index.get(s) {
            return i;
        }
        let i = strings.len();
        strings.push(s.to_string());
        index.insert(s.to_string(), i);
        i
    }

    /// Returns the string at index `i`.
    ///
    /// Panics if `i` was never handed out by this table; that means the
    /// caller mixed up tables or decoded a corrupt one.
    pub fn get(&self, i: usize) -> String {
        let inner = self.inner.read();
        match inner.strings.get(i) {
            Some(s) => s.clone(),
            None => panic!(
                "string table index {} out of range (table has {} strings)",
                i,
                inner.strings.len()
            ),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every interned string in index order.
    pub fn strings(&self) -> Vec<String> {
        self.inner.read().strings.clone()
    }
}

impl From<Vec<String>> for StringTable {
    fn from(strings: Vec<String>) -> Self {
        StringTable {
            inner: RwLock::new(Inner {
                strings,
                index: None,
            }),
        }
    }
}

impl Serialize for StringTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.inner.read().strings.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for StringTable {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(StringTable::from(Vec::<String>::deserialize(deserializer)?))
    }
}
