//! Indexed parameter pools.

use std::collections::HashMap;

use tracing::info;

/// Metadata keys attached to a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    /// Number of senones described by the pool.
    NumSenones,
    /// Number of feature streams.
    NumStreams,
    /// Number of Gaussians per tied state.
    NumGaussiansPerState,
}

/// An indexed collection mapping a dense integer id to values of type `T`,
/// plus a small feature map carrying integer metadata.
///
/// Pools are filled once during load and read-only thereafter.
#[derive(Debug, Clone)]
pub struct Pool<T> {
    name: String,
    data: Vec<T>,
    features: HashMap<Feature, i32>,
}

impl<T> Pool<T> {
    /// Create an empty pool with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: Vec::new(),
            features: HashMap::new(),
        }
    }

    /// The name of the pool.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Place `value` at `id`, growing the pool as needed.
    ///
    /// Loaders fill pools densely in id order; placing past the current
    /// end is a programming error.
    pub fn put(&mut self, id: usize, value: T) {
        if id == self.data.len() {
            self.data.push(value);
        } else {
            self.data[id] = value;
        }
    }

    /// The value with the given id.
    pub fn get(&self, id: usize) -> &T {
        &self.data[id]
    }

    /// The number of values in the pool.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Whether the pool holds no values.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Iterate over the values in id order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.data.iter()
    }

    /// Attach integer metadata to the pool.
    pub fn set_feature(&mut self, feature: Feature, value: i32) {
        self.features.insert(feature, value);
    }

    /// Read integer metadata, falling back to `default` when absent.
    pub fn feature(&self, feature: Feature, default: i32) -> i32 {
        self.features.get(&feature).copied().unwrap_or(default)
    }

    /// Log the pool name and size at info level.
    pub fn log_info(&self) {
        info!("Pool {} entries: {}", self.name, self.data.len());
    }
}
