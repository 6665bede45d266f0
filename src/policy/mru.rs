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

/// Same stack as [`crate::policy::LruPolicy`]: the only behavioural
/// difference is which end of the list `victim` reads from — the
/// most-recently touched key, not the least.
#[derive(Default)]
pub struct MruPolicy {
	map: HashMap<CompositeKey, Index<CompositeKey>, BuildNoHashHasher<CompositeKey>>,
	stack: VecList<CompositeKey>,
}

impl EvictionPolicy for MruPolicy {
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
		self.stack.front().copied()
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
