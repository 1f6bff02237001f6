use std::{ops::Index, slice};

use parking_lot::Mutex;

/// A single URL parameter, consisting of a key and a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    /// The placeholder name, without its `:` or `*` sigil.
    pub key: String,
    /// The matched path bytes; a catch-all value keeps its leading `/`.
    pub value: String,
}

/// The URL parameters bound by a lookup, ordered by the left-to-right
/// appearance of the placeholders in the registered pattern.
///
/// Since the order is fixed, it is also safe to read values by index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<Param>);

impl Params {
    /// Creates an empty parameter list.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    fn with_capacity(capacity: usize) -> Self {
        Self(Vec::with_capacity(capacity))
    }

    /// Returns the value of the first parameter whose key matches `name`.
    pub fn by_name(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|param| param.key == name)
            .map(|param| param.value.as_str())
    }

    /// Returns the number of bound parameters.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no parameter was bound.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the parameters in pattern order.
    pub fn iter(&self) -> slice::Iter<'_, Param> {
        self.0.iter()
    }

    pub(crate) fn push(&mut self, key: String, value: String) {
        self.0.push(Param { key, value });
    }

    fn clear(&mut self) {
        self.0.clear();
    }
}

impl Index<usize> for Params {
    type Output = Param;

    fn index(&self, index: usize) -> &Param {
        &self.0[index]
    }
}

impl<'a> IntoIterator for &'a Params {
    type Item = &'a Param;
    type IntoIter = slice::Iter<'a, Param>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A free list of parameter buffers, reused across lookups so that binding
/// parameters does not have to grow a fresh buffer on every request.
#[derive(Default)]
pub(crate) struct ParamsPool {
    free: Mutex<Vec<Params>>,
}

impl ParamsPool {
    /// Borrows a buffer, reset to zero length, with room for `capacity`
    /// parameters.
    pub(crate) fn get(&self, capacity: usize) -> Params {
        match self.free.lock().pop() {
            Some(mut params) => {
                params.clear();
                params.0.reserve(capacity);
                params
            }
            None => Params::with_capacity(capacity),
        }
    }

    /// Returns a buffer to the free list.
    pub(crate) fn put(&self, params: Params) {
        self.free.lock().push(params);
    }
}
