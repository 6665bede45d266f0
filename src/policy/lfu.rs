/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::collections::{BTreeMap, HashMap};

use dlv_list::{Index, VecList};
use nohash_hasher::BuildNoHashHasher;

use crate::{message::CompositeKey, policy::EvictionPolicy};

struct Entry {
	frequency: u64,
	index: Index<CompositeKey>,
}

/// Frequency buckets ordered by a `BTreeMap`, each bucket itself an
/// insertion-ordered `VecList` so that, within a frequency, the
/// least-recently-touched key is the tie-break victim.
#[derive(Default)]
pub struct LfuPolicy {
	entries: HashMap<CompositeKey, Entry, BuildNoHashHasher<CompositeKey>>,
	buckets: BTreeMap<u64, VecList<CompositeKey>>,
}

impl LfuPolicy {
	fn bump(&mut self, key: CompositeKey, new_frequency: u64) {
		let index = self.buckets
			.entry(new_frequency)
			.or_default()
			.push_back(key);

		self.entries.insert(key, Entry { frequency: new_frequency, index });
	}

	fn unlink(&mut self, key: CompositeKey) -> Option<u64> {
		let entry = self.entries.remove(&key)?;

		if let Some(bucket) = self.buckets.get_mut(&entry.frequency) {
			bucket.remove(entry.index);

			if bucket.is_empty() {
				self.buckets.remove(&entry.frequency);
			}
		}

		Some(entry.frequency)
	}
}

impl EvictionPolicy for LfuPolicy {
	fn touch(&mut self, key: CompositeKey) {
		let next_frequency = match self.unlink(key) {
			Some(frequency) => frequency + 1,
			None => 1,
		};

		self.bump(key, next_frequency);
	}

	fn remove(&mut self, key: CompositeKey) {
		self.unlink(key);
	}

	fn victim(&mut self) -> Option<CompositeKey> {
		self.buckets
			.iter()
			.next()
			.and_then(|(_, bucket)| bucket.front())
			.copied()
	}

	fn contains(&self, key: CompositeKey) -> bool {
		self.entries.contains_key(&key)
	}

	fn len(&self) -> usize {
		self.entries.len()
	}

	fn clear(&mut self) {
		self.entries.clear();
		self.buckets.clear();
	}
}
