//! Batch shapes accepted by the manager
//!
//! A batch is split into its items and a shape description, the items are
//! processed concurrently, and the results are put back into the same shape:
//! a list stays a list in input order, a keyed map stays a map with the same
//! keys.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

/// A collection of requests whose results keep the collection's shape
pub trait Batch {
    /// One request
    type Item;

    /// The same collection shape holding values of `T`
    type Output<T>;

    /// Everything needed to rebuild the shape
    type Keys;

    /// Split into the shape and the items in a fixed order
    fn into_parts(self) -> (Self::Keys, Vec<Self::Item>);

    /// Rebuild the shape from values in the order of `into_parts`
    fn from_parts<T>(keys: Self::Keys, values: Vec<T>) -> Self::Output<T>;
}

impl<R> Batch for Vec<R> {
    type Item = R;
    type Output<T> = Vec<T>;
    type Keys = ();

    fn into_parts(self) -> ((), Vec<R>) {
        ((), self)
    }

    fn from_parts<T>(_keys: (), values: Vec<T>) -> Vec<T> {
        values
    }
}

impl<K: Ord, R> Batch for BTreeMap<K, R> {
    type Item = R;
    type Output<T> = BTreeMap<K, T>;
    type Keys = Vec<K>;

    fn into_parts(self) -> (Vec<K>, Vec<R>) {
        self.into_iter().unzip()
    }

    fn from_parts<T>(keys: Vec<K>, values: Vec<T>) -> BTreeMap<K, T> {
        keys.into_iter().zip(values).collect()
    }
}

impl<K: Eq + Hash, R> Batch for HashMap<K, R> {
    type Item = R;
    type Output<T> = HashMap<K, T>;
    type Keys = Vec<K>;

    fn into_parts(self) -> (Vec<K>, Vec<R>) {
        self.into_iter().unzip()
    }

    fn from_parts<T>(keys: Vec<K>, values: Vec<T>) -> HashMap<K, T> {
        keys.into_iter().zip(values).collect()
    }
}
