//! Scoped key/value storage attached to a single connection or event.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

/// A small type-erased map owned by one connection or one event.
///
/// Listeners use it to hand values (usually open spans) from the "before"
/// half of a notification to the "after" half. The store is dropped together
/// with its owner, so nothing outlives the connection or event it belongs to.
#[derive(Default)]
pub struct ValueStore {
    values: HashMap<&'static str, Box<dyn Any + Send + Sync>>,
}

impl ValueStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value, returning the previous value under `key` if it had the same type.
    pub fn put<T>(&mut self, key: &'static str, value: T) -> Option<T>
    where
        T: Any + Send + Sync,
    {
        self.values
            .insert(key, Box::new(value))
            .and_then(|previous| previous.downcast::<T>().ok())
            .map(|previous| *previous)
    }

    /// Borrow the value under `key` if it has type `T`.
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.values.get(key).and_then(|value| value.downcast_ref::<T>())
    }

    /// Mutably borrow the value under `key` if it has type `T`.
    pub fn get_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.values
            .get_mut(key)
            .and_then(|value| value.downcast_mut::<T>())
    }

    /// Take ownership of the value under `key`.
    ///
    /// A value of a different type is left in place and `None` is returned.
    pub fn remove<T: Any>(&mut self, key: &'static str) -> Option<T> {
        let value = self.values.remove(key)?;
        match value.downcast::<T>() {
            Ok(value) => Some(*value),
            Err(value) => {
                self.values.insert(key, value);
                None
            }
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for ValueStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_and_remove() {
        let mut store = ValueStore::new();
        assert!(store.put("span", 7_u32).is_none());
        assert_eq!(store.get::<u32>("span"), Some(&7));

        assert_eq!(store.remove::<u32>("span"), Some(7));
        assert!(store.remove::<u32>("span").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_put_returns_previous_value() {
        let mut store = ValueStore::new();
        store.put("tx", String::from("first"));
        let previous = store.put("tx", String::from("second"));

        assert_eq!(previous.as_deref(), Some("first"));
        assert_eq!(store.get::<String>("tx").map(String::as_str), Some("second"));
    }

    #[test]
    fn test_remove_with_wrong_type_keeps_value() {
        let mut store = ValueStore::new();
        store.put("count", 3_u64);

        assert!(store.remove::<String>("count").is_none());
        assert!(store.contains_key("count"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_get_mut() {
        let mut store = ValueStore::new();
        store.put("rows", vec![1, 2]);
        if let Some(rows) = store.get_mut::<Vec<i32>>("rows") {
            rows.push(3);
        }
        assert_eq!(store.get::<Vec<i32>>("rows"), Some(&vec![1, 2, 3]));
    }
}
