/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! A sorted-map overlay over [`Sequence`], kept thin on purpose: every
//! operation is a binary search plus an `insert`/`erase`/`at` on the
//! underlying sequence.

use typesize::TypeSize;

use crate::{
	error::CacheError,
	manager::CacheManager,
	sequence::{NoPrefetch, PrefetchStrategy, Sequence},
	transport::Transport,
};

/// A `(K, V)` pair kept sorted by `K` inside a [`Sequence`]. `get`, `insert`
/// and `remove` all locate their key with one binary search over the
/// backing sequence; there is no separate index structure to keep in sync.
pub struct SortedMap<K, V, const B: usize, Tr: Transport, S: PrefetchStrategy = NoPrefetch> {
	entries: Sequence<(K, V), B, Tr, S>,
}

impl<K, V, const B: usize, Tr: Transport, S: PrefetchStrategy> SortedMap<K, V, B, Tr, S>
where
	K: Copy + Default + Ord,
	V: Copy + Default,
{
	#[must_use]
	pub fn new(manager: CacheManager<Tr>, structure_id: u32) -> Self {
		SortedMap { entries: Sequence::new(manager, structure_id) }
	}

	#[must_use]
	pub fn len(&self) -> u64 {
		self.entries.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Binary-searches for `key`, returning [`Probe::Found`] on an exact
	/// match or [`Probe::Missing`] with the insertion point otherwise —
	/// implemented by hand (rather than delegating to `slice::binary_search`)
	/// since [`Sequence`] indexing is fallible, each probe may cross the
	/// network.
	fn locate(&mut self, key: &K) -> Result<Probe, CacheError> {
		let mut low = 0u64;
		let mut high = self.entries.len();

		while low < high {
			let mid = low + (high - low) / 2;
			let (mid_key, _) = self.entries.at(mid)?;

			match mid_key.cmp(key) {
				std::cmp::Ordering::Equal => return Ok(Probe::Found(mid)),
				std::cmp::Ordering::Less => low = mid + 1,
				std::cmp::Ordering::Greater => high = mid,
			}
		}

		Ok(Probe::Missing(low))
	}

	/// Looks up `key`, returning its value if present.
	pub fn get(&mut self, key: &K) -> Result<Option<V>, CacheError> {
		match self.locate(key)? {
			Probe::Found(index) => Ok(Some(self.entries.at(index)?.1)),
			Probe::Missing(_) => Ok(None),
		}
	}

	pub fn contains_key(&mut self, key: &K) -> bool {
		matches!(self.locate(key), Ok(Probe::Found(_)))
	}

	/// Inserts `(key, value)`, overwriting any existing value for `key`.
	pub fn insert(&mut self, key: K, value: V) -> Result<(), CacheError> {
		match self.locate(&key)? {
			Probe::Found(index) => self.entries.set(index, (key, value)),
			Probe::Missing(index) => self.entries.insert(index, (key, value)),
		}
	}

	/// Returns the value for `key`, inserting `V::default()` first if it
	/// was absent.
	pub fn get_or_insert_default(&mut self, key: K) -> Result<V, CacheError> {
		match self.locate(&key)? {
			Probe::Found(index) => Ok(self.entries.at(index)?.1),

			Probe::Missing(index) => {
				self.entries.insert(index, (key, V::default()))?;
				Ok(V::default())
			},
		}
	}

	/// Removes `key`, returning its value if it was present.
	pub fn remove(&mut self, key: &K) -> Result<Option<V>, CacheError> {
		match self.locate(key)? {
			Probe::Found(index) => Ok(Some(self.entries.erase(index)?.1)),
			Probe::Missing(_) => Ok(None),
		}
	}
}

/// Result of [`SortedMap::locate`]'s binary search.
enum Probe {
	Found(u64),
	Missing(u64),
}

impl<K, V, const B: usize, Tr: Transport, S: PrefetchStrategy> SortedMap<K, V, B, Tr, S>
where
	K: Copy + Default + Ord + TypeSize,
	V: Copy + Default + TypeSize,
{
	/// Approximate in-memory footprint of one resident `(K, V)` pair,
	/// using `typesize` rather than `size_of` so heap-backed key/value
	/// types report their real size — the same accounting `paper-cache`
	/// applies to its own cached objects.
	#[must_use]
	pub fn pair_memory_size(key: &K, value: &V) -> u64 {
		(key.get_size() + value.get_size()) as u64
	}
}
