/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::collections::HashMap;

use dlv_list::{Index, VecList};
use nohash_hasher::BuildNoHashHasher;

use crate::{message::CompositeKey, policy::EvictionPolicy};

/// Most-recent → least-recent doubly-linked list plus a handle map:
/// `touch` splices to the front in O(1), `victim` pops the back.
#[derive(Default)]
pub struct LruPolicy {
	map: HashMap<CompositeKey, Index<CompositeKey>, BuildNoHashHasher<CompositeKey>>,
	stack: VecList<CompositeKey>,
}

impl EvictionPolicy for LruPolicy {
	fn touch(&mut self, key: CompositeKey) {
		if let Some(index) = self.map.remove(&key) {
			self.stack.remove(index);
		}

		let index = self.stack.push_front(key);
		self.map.insert(key, index);
	}

	fn remove(&mut self, key: CompositeKey) {
		if let Some(index) = self.map.remove(&key) {
			self.stack.remove(index);
		}
	}

	fn victim(&mut self) -> Option<CompositeKey> {
		self.stack.back().copied()
	}

	fn contains(&self, key: CompositeKey) -> bool {
		self.map.contains_key(&key)
	}

	fn len(&self) -> usize {
		self.stack.len()
	}

	fn clear(&mut self) {
		self.map.clear();
		self.stack.clear();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn it_evicts_the_least_recently_used_key() {
		let mut policy = LruPolicy::default();

		for key in [0, 1, 1, 1, 0, 2, 3, 0, 2, 0] {
			policy.touch(key);
		}

		let mut evictions = Vec::new();

		while let Some(victim) = policy.victim() {
			evictions.push(victim);
			policy.remove(victim);
		}

		assert_eq!(evictions, vec![1, 3, 2, 0]);
	}

	#[test]
	fn touching_a_resident_key_again_protects_it_from_the_next_eviction() {
		// three resident keys, then key 10 is read again: it must become
		// the most recently used, leaving 11 as the next eviction.
		let mut policy = LruPolicy::default();

		policy.touch(10);
		policy.touch(11);
		policy.touch(12);
		policy.touch(10);

		assert_eq!(policy.victim(), Some(11));
	}
}
