/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The cache core: a plain `key -> Message` map plus byte
//! accounting and one eviction policy. No transport, no rank awareness —
//! [`crate::manager::CacheManager`] is the only caller, and it is the only
//! place ownership/transport concerns live.

use std::collections::HashMap;

use log::{debug, trace};
use nohash_hasher::BuildNoHashHasher;

use crate::{
	error::CacheError,
	message::{CompositeKey, Message},
	policy::{self, EvictionPolicy, Policy},
};

type EntryMap = HashMap<CompositeKey, Message, BuildNoHashHasher<CompositeKey>>;

pub struct CacheCore {
	entries: EntryMap,
	policy: Box<dyn EvictionPolicy>,
	capacity_bytes: u64,
	current_bytes: u64,
}

impl CacheCore {
	#[must_use]
	pub fn new(capacity_bytes: u64, policy: Policy) -> Self {
		CacheCore {
			entries: HashMap::with_hasher(BuildNoHashHasher::default()),
			policy: policy::build(policy),
			capacity_bytes,
			current_bytes: 0,
		}
	}

	#[must_use]
	pub fn capacity_bytes(&self) -> u64 {
		self.capacity_bytes
	}

	#[must_use]
	pub fn current_bytes(&self) -> u64 {
		self.current_bytes
	}

	#[must_use]
	pub fn contains(&self, key: CompositeKey) -> bool {
		self.entries.contains_key(&key)
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Every composite key currently resident, for observability and tests.
	pub fn keys(&self) -> impl Iterator<Item = CompositeKey> + '_ {
		self.entries.keys().copied()
	}

	/// Returns a resident block and records a reference against it.
	pub fn lookup(&mut self, key: CompositeKey) -> Option<&Message> {
		if self.entries.contains_key(&key) {
			self.policy.touch(key);
			trace!("cache hit for key {key:#x}");
		}

		self.entries.get(&key)
	}

	/// Admits `message` under `key`, evicting victims first if needed to
	/// make room — eviction happens before admission, never after.
	/// Returns the evicted blocks in eviction order so the caller can ship
	/// each one back to its owning worker before it is dropped.
	pub fn store(&mut self, key: CompositeKey, message: Message) -> Result<Vec<Message>, CacheError> {
		let size = message.size();

		if size > self.capacity_bytes {
			return Err(CacheError::BlockExceedsCapacity { size, capacity: self.capacity_bytes });
		}

		let existing_size = self.entries.get(&key).map(Message::size).unwrap_or(0);
		let mut evicted = Vec::new();

		while self.current_bytes - existing_size + size > self.capacity_bytes {
			let victim_key = self.policy.victim()
				.ok_or(CacheError::Internal("eviction required but no victim is available"))?;

			if victim_key == key {
				// the only resident entry large enough to make room is the
				// one we are about to replace; let the replacement below
				// absorb it instead of evicting it out from under itself.
				break;
			}

			let victim = self.erase(victim_key)
				.ok_or(CacheError::Internal("policy named a victim the cache core has no entry for"))?;

			debug!("evicted key {victim_key:#x} ({} bytes)", victim.size());
			evicted.push(victim);
		}

		if let Some(old) = self.entries.insert(key, message) {
			self.current_bytes -= old.size();
		}

		self.current_bytes += size;
		self.policy.touch(key);

		Ok(evicted)
	}

	/// Removes `key` unconditionally, returning its block if it was
	/// resident.
	pub fn erase(&mut self, key: CompositeKey) -> Option<Message> {
		let message = self.entries.remove(&key)?;

		self.current_bytes -= message.size();
		self.policy.remove(key);

		Some(message)
	}

	pub fn clear(&mut self) {
		self.entries.clear();
		self.policy.clear();
		self.current_bytes = 0;
	}

	/// Shrinks or grows the capacity, evicting as needed if it shrinks
	/// below the current footprint.
	pub fn resize(&mut self, capacity_bytes: u64) -> Result<Vec<Message>, CacheError> {
		if capacity_bytes == 0 {
			return Err(CacheError::ZeroCapacity);
		}

		self.capacity_bytes = capacity_bytes;
		let mut evicted = Vec::new();

		while self.current_bytes > self.capacity_bytes {
			let victim_key = self.policy.victim()
				.ok_or(CacheError::Internal("resize needs eviction but no victim is available"))?;

			let victim = self.erase(victim_key)
				.ok_or(CacheError::Internal("policy named a victim the cache core has no entry for"))?;

			evicted.push(victim);
		}

		Ok(evicted)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::message::{Tag, HEADER_SIZE};

	// every Message carries a 20-byte header regardless of payload, so an
	// empty-payload block is the simplest unit of account: exactly
	// `HEADER_SIZE` bytes. The block-id is embedded so a stored entry's own
	// key can be recovered from an evicted Message in assertions below.
	fn block(block_id: u32) -> Message {
		Message::create(0, Tag::StoreBlock, 0, 0, block_id)
	}

	#[test]
	fn it_evicts_before_admitting_when_over_capacity() {
		let capacity = HEADER_SIZE as u64 * 2;
		let mut cache = CacheCore::new(capacity, Policy::Lru);

		cache.store(1, block(1)).unwrap();
		cache.store(2, block(2)).unwrap();
		assert_eq!(cache.current_bytes(), capacity);

		let evicted = cache.store(3, block(3)).unwrap();

		assert_eq!(evicted.len(), 1);
		assert!(!cache.contains(1));
		assert!(cache.contains(2));
		assert!(cache.contains(3));
	}

	#[test]
	fn it_rejects_a_block_larger_than_capacity() {
		let mut cache = CacheCore::new(HEADER_SIZE as u64, Policy::Lru);
		let oversized = Message::with_payload(Tag::StoreBlock, 0, 1, 0, &[0u8; 32]);
		let err = cache.store(1, oversized).unwrap_err();

		assert_eq!(err, CacheError::BlockExceedsCapacity {
			size: HEADER_SIZE as u64 + 32,
			capacity: HEADER_SIZE as u64,
		});
	}

	#[test]
	fn lookup_records_a_reference_that_changes_the_next_victim() {
		let capacity = HEADER_SIZE as u64 * 3;
		let mut cache = CacheCore::new(capacity, Policy::Lru);

		cache.store(1, block(1)).unwrap();
		cache.store(2, block(2)).unwrap();
		cache.store(3, block(3)).unwrap();

		cache.lookup(1);
		let evicted = cache.store(4, block(4)).unwrap();

		assert_eq!(evicted[0].key(), 2);
	}

	#[test]
	fn erase_removes_an_entry_and_its_policy_bookkeeping() {
		let capacity = HEADER_SIZE as u64 * 2;
		let mut cache = CacheCore::new(capacity, Policy::Lru);

		cache.store(1, block(1)).unwrap();
		let erased = cache.erase(1).unwrap();

		assert_eq!(erased.key(), 1);
		assert!(!cache.contains(1));
		assert_eq!(cache.current_bytes(), 0);
	}
}
