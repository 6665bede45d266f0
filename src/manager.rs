/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The cache manager: runs at [`crate::topology::MANAGER_RANK`],
//! owns the single [`CacheCore`] and the only [`crate::policy::EvictionPolicy`]
//! instance in the whole run, and is the one participant that ever talks to
//! workers over a [`Transport`].

use log::{debug, warn};

use crate::{
	cache::CacheCore,
	config::Config,
	error::CacheError,
	message::{composite_key, split_key, Message, Tag},
	policy::Policy,
	stats::{SharedStats, Stats},
	topology::owner_rank,
	transport::Transport,
};

/// Orchestrates the cache core against a fleet of workers. Single-threaded,
/// cooperative: every public method runs to completion before the next
/// message is sent or received — no lock discipline needed.
pub struct CacheManager<T: Transport> {
	transport: T,
	core: CacheCore,
	world_size: u32,
	stats: SharedStats,
}

impl<T: Transport> CacheManager<T> {
	/// Builds a manager bound to `transport`, which must report
	/// `rank() == MANAGER_RANK`.
	pub fn new(transport: T, config: Config) -> Result<Self, CacheError> {
		if transport.rank() != crate::topology::MANAGER_RANK {
			return Err(CacheError::Internal("CacheManager must run at MANAGER_RANK"));
		}

		let world_size = transport.world_size();

		Ok(CacheManager {
			transport,
			core: CacheCore::new(config.cache_capacity_bytes, config.eviction_policy),
			world_size,
			stats: SharedStats::default(),
		})
	}

	#[must_use]
	pub fn stats(&self) -> Stats {
		self.stats.snapshot()
	}

	/// A cloneable handle another thread can poll for cache health without
	/// touching the manager's single-threaded loop.
	#[must_use]
	pub fn shared_stats(&self) -> SharedStats {
		self.stats.clone()
	}

	fn owner(&self, block_id: u32) -> u32 {
		owner_rank(block_id, self.world_size)
	}

	/// Whether `(structure_id, block_id)` is resident in the local cache
	/// right now, without recording a reference against it.
	#[must_use]
	pub fn contains_locally(&self, structure_id: u32, block_id: u32) -> bool {
		self.core.contains(composite_key(structure_id, block_id))
	}

	/// The block-ids of `structure_id` currently resident locally, for
	/// observability and tests — not part of the hot path.
	#[must_use]
	pub fn resident_block_ids(&self, structure_id: u32) -> std::collections::BTreeSet<u32> {
		self.core.keys()
			.filter_map(|key| {
				let (sid, block_id) = split_key(key);
				(sid == structure_id).then_some(block_id)
			})
			.collect()
	}

	/// Fetches a block that is already resident in the manager's local
	/// cache core, without touching the network. Returns `None` on a
	/// local miss — the caller decides whether to fall back to
	/// [`CacheManager::get_block_or_fetch`].
	pub fn get_block(&mut self, structure_id: u32, block_id: u32) -> Option<&Message> {
		let key = composite_key(structure_id, block_id);
		self.core.lookup(key)
	}

	/// Fetches a block, going to its owning worker over the network on a
	/// local miss: every block lives either in the manager's cache or
	/// on its owning worker, never neither.
	pub fn get_block_or_fetch(&mut self, structure_id: u32, block_id: u32) -> Result<Message, CacheError> {
		let key = composite_key(structure_id, block_id);

		if let Some(message) = self.core.lookup(key) {
			self.stats.update(Stats::hit);
			return Ok(message.clone_owned());
		}

		self.stats.update(Stats::miss);

		let dest = self.owner(block_id);
		let request = Message::create(0, Tag::GetBlock, self.transport.rank(), structure_id, block_id);
		self.transport.send(request, dest)?;

		let reply = self.transport.recv(Some(dest))?;

		match reply.tag() {
			Tag::StoreBlock => {
				let evicted = self.core.store(key, reply.clone_owned())?;
				self.ship_evicted(evicted)?;
				Ok(reply)
			},

			Tag::BlockNotFound => {
				// every block is guaranteed to exist somewhere; a miss here means
				// ownership bookkeeping has diverged between manager and
				// worker, which is a programmer error, not a retryable one.
				Err(CacheError::BlockNotFound { structure_id, block_id })
			},

			other => {
				warn!("unexpected reply tag {other:?} to GET_BLOCK");
				Err(CacheError::InvalidTag)
			},
		}
	}

	/// Admits `message` into the local cache, evicting as needed, and ships
	/// every evicted block back to its owning worker before returning.
	pub fn store_block(&mut self, structure_id: u32, block_id: u32, message: Message) -> Result<(), CacheError> {
		let key = composite_key(structure_id, block_id);
		let evicted = self.core.store(key, message)?;

		self.ship_evicted(evicted)
	}

	/// Removes a block from wherever it lives: the local cache if
	/// resident, otherwise an ERASE_BLOCK sent to its owning worker.
	pub fn erase_block(&mut self, structure_id: u32, block_id: u32) -> Result<(), CacheError> {
		let key = composite_key(structure_id, block_id);

		if self.core.erase(key).is_some() {
			debug!("erased locally-resident block ({structure_id}, {block_id})");
			return Ok(());
		}

		let dest = self.owner(block_id);
		let msg = Message::create(0, Tag::EraseBlock, self.transport.rank(), structure_id, block_id);
		self.transport.send(msg, dest)
	}

	/// Issues a non-blocking GET_BLOCK for `block_id` to its owner, to be
	/// consumed later by a matching [`CacheManager::get_block_or_fetch`]
	/// call — the sequential-prefetch path.
	pub fn prefetch(&self, structure_id: u32, block_id: u32) -> Result<crate::transport::RecvHandle, CacheError> {
		let dest = self.owner(block_id);
		let request = Message::create(0, Tag::GetBlock, self.transport.rank(), structure_id, block_id);
		self.transport.send(request, dest)?;

		self.transport.recv_nonblocking_begin(dest)
	}

	/// Blocks on a handle previously returned by [`CacheManager::prefetch`]
	/// and admits the result into the local cache, exactly as
	/// [`CacheManager::get_block_or_fetch`] would for a fresh fetch.
	pub fn consume_prefetch(
		&mut self,
		structure_id: u32,
		block_id: u32,
		handle: crate::transport::RecvHandle,
	) -> Result<Message, CacheError> {
		let reply = self.transport.recv_wait(handle)?;

		match reply.tag() {
			Tag::StoreBlock => {
				let key = composite_key(structure_id, block_id);
				let evicted = self.core.store(key, reply.clone_owned())?;
				self.ship_evicted(evicted)?;
				Ok(reply)
			},

			Tag::BlockNotFound => Err(CacheError::BlockNotFound { structure_id, block_id }),

			other => {
				warn!("unexpected reply tag {other:?} to a prefetched GET_BLOCK");
				Err(CacheError::InvalidTag)
			},
		}
	}

	/// Broadcasts FINISH to every worker, ending the run. Idempotent per
	/// worker in the sense that a second FINISH to an already-shut-down
	/// worker is simply never sent (the manager only calls this once).
	pub fn finalize(&self) -> Result<(), CacheError> {
		for rank in 1..self.world_size {
			self.transport.send(Message::create(0, Tag::Finish, self.transport.rank(), 0, 0), rank)?;
		}

		Ok(())
	}

	/// Sends each evicted block back to the worker that owns its block-id.
	/// Evicted blocks always own their buffer (they came out of the cache
	/// core's map), so no clone is needed before sending.
	fn ship_evicted(&self, evicted: Vec<Message>) -> Result<(), CacheError> {
		for message in evicted {
			self.stats.update(Stats::eviction);

			let header = message.header();
			let dest = self.owner(header.block_id);

			self.transport.send(message, dest)?;
		}

		Ok(())
	}

	/// Changes the capacity of the local cache core, evicting as needed.
	pub fn resize(&mut self, capacity_bytes: u64) -> Result<(), CacheError> {
		let evicted = self.core.resize(capacity_bytes)?;
		self.ship_evicted(evicted)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{transport::ChannelTransport, worker::WorkerLoop};

	#[test]
	fn it_fetches_a_block_from_its_owning_worker_on_a_local_miss() {
		let mut fabric = ChannelTransport::fabric(2);
		let worker_transport = fabric.remove(1);
		let manager_transport = fabric.remove(0);

		// seed the worker directly, simulating a block that reached it via
		// an earlier eviction.
		manager_transport.send(Message::with_payload(Tag::StoreBlock, 0, 1, 5, &[7, 7]), 1).unwrap();

		let worker_thread = std::thread::spawn(move || {
			let mut worker = WorkerLoop::new(worker_transport);
			worker.run().unwrap();
		});

		let config = Config::new(1024, Policy::Lru, 32, 2).unwrap();
		let mut manager = CacheManager::new(manager_transport, config).unwrap();

		let fetched = manager.get_block_or_fetch(1, 5).unwrap();
		assert_eq!(fetched.payload(), &[7, 7]);

		manager.finalize().unwrap();
		worker_thread.join().unwrap();
	}

	#[test]
	fn store_block_ships_evicted_entries_to_their_owning_worker() {
		let mut fabric = ChannelTransport::fabric(3);
		let worker_a = fabric.remove(1);
		// world_size=3 -> workers at rank 1 and 2; owner_rank(block_id, 3) = 1 + block_id % 2
		let manager_transport = fabric.remove(0);

		let config = Config::new((crate::message::HEADER_SIZE as u64) * 2, Policy::Lru, 32, 3).unwrap();
		let mut manager = CacheManager::new(manager_transport, config).unwrap();

		// both block-ids 0 and 2 hash to rank 1 under world_size=3
		manager.store_block(1, 0, Message::create(0, Tag::StoreBlock, 0, 1, 0)).unwrap();
		manager.store_block(1, 2, Message::create(0, Tag::StoreBlock, 0, 1, 2)).unwrap();
		manager.store_block(1, 4, Message::create(0, Tag::StoreBlock, 0, 1, 4)).unwrap();

		let shipped = worker_a.recv(None).unwrap();
		assert_eq!(shipped.tag(), Tag::StoreBlock);

		manager.finalize().unwrap();
	}

	#[test]
	fn get_block_returns_none_on_a_local_miss_and_some_after_admission() {
		let mut fabric = ChannelTransport::fabric(2);
		let manager_transport = fabric.remove(0);

		let config = Config::new(1024, Policy::Lru, 32, 2).unwrap();
		let mut manager = CacheManager::new(manager_transport, config).unwrap();

		assert!(manager.get_block(1, 5).is_none());

		manager.store_block(1, 5, Message::with_payload(Tag::StoreBlock, 0, 1, 5, &[9])).unwrap();

		assert_eq!(manager.get_block(1, 5).unwrap().payload(), &[9]);
	}

	#[test]
	fn erase_block_removes_a_resident_entry_locally() {
		let mut fabric = ChannelTransport::fabric(2);
		let manager_transport = fabric.remove(0);

		let config = Config::new(1024, Policy::Lru, 32, 2).unwrap();
		let mut manager = CacheManager::new(manager_transport, config).unwrap();

		manager.store_block(1, 5, Message::create(0, Tag::StoreBlock, 0, 1, 5)).unwrap();
		assert!(manager.contains_locally(1, 5));

		manager.erase_block(1, 5).unwrap();
		assert!(!manager.contains_locally(1, 5));
	}

	#[test]
	fn erase_block_sends_erase_block_to_the_owning_worker_on_a_remote_miss() {
		let mut fabric = ChannelTransport::fabric(2);
		let worker_transport = fabric.remove(1);
		let manager_transport = fabric.remove(0);

		let config = Config::new(1024, Policy::Lru, 32, 2).unwrap();
		let mut manager = CacheManager::new(manager_transport, config).unwrap();

		manager.erase_block(1, 9).unwrap();

		let received = worker_transport.recv(None).unwrap();
		assert_eq!(received.tag(), Tag::EraseBlock);
		assert_eq!(received.key(), composite_key(1, 9));
	}
}
