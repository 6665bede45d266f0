/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::collections::HashMap;

use nohash_hasher::BuildNoHashHasher;

use crate::{message::CompositeKey, policy::EvictionPolicy};

struct Slot {
	key: CompositeKey,
	used: bool,
	live: bool,
}

/// Bit-pseudo-LRU / CLOCK: a ring of slots each carrying one "used" bit.
/// `touch` sets the bit; `victim` sweeps the hand forward, clearing used
/// bits as it goes, and stops (without advancing past it) on the first
/// unused live slot. Tombstoned slots from [`EvictionPolicy::remove`] are
/// recycled on the next insert rather than shifting the ring.
#[derive(Default)]
pub struct PlruPolicy {
	slots: Vec<Slot>,
	position: HashMap<CompositeKey, usize, BuildNoHashHasher<CompositeKey>>,
	free: Vec<usize>,
	hand: usize,
	live_count: usize,
}

impl EvictionPolicy for PlruPolicy {
	fn touch(&mut self, key: CompositeKey) {
		if let Some(&idx) = self.position.get(&key) {
			self.slots[idx].used = true;
			return;
		}

		let idx = match self.free.pop() {
			Some(idx) => {
				self.slots[idx] = Slot { key, used: true, live: true };
				idx
			},

			None => {
				self.slots.push(Slot { key, used: true, live: true });
				self.slots.len() - 1
			},
		};

		self.position.insert(key, idx);
		self.live_count += 1;
	}

	fn remove(&mut self, key: CompositeKey) {
		let Some(idx) = self.position.remove(&key) else { return };

		self.slots[idx].live = false;
		self.free.push(idx);
		self.live_count -= 1;

		if idx == self.hand && !self.slots.is_empty() {
			self.hand = (self.hand + 1) % self.slots.len();
		}
	}

	fn victim(&mut self) -> Option<CompositeKey> {
		if self.live_count == 0 {
			return None;
		}

		let n = self.slots.len();

		loop {
			let idx = self.hand;
			let slot = &mut self.slots[idx];

			if !slot.live {
				self.hand = (self.hand + 1) % n;
				continue;
			}

			if slot.used {
				slot.used = false;
				self.hand = (self.hand + 1) % n;
				continue;
			}

			return Some(slot.key);
		}
	}

	fn contains(&self, key: CompositeKey) -> bool {
		self.position.contains_key(&key)
	}

	fn len(&self) -> usize {
		self.live_count
	}

	fn clear(&mut self) {
		self.slots.clear();
		self.position.clear();
		self.free.clear();
		self.hand = 0;
		self.live_count = 0;
	}
}
