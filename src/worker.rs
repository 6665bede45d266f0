/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The worker loop: serves block storage for exactly the
//! block-ids that hash to this worker's rank. Unbounded store, single
//! message-driven loop, never mutates block contents.

use std::collections::HashMap;

use log::{debug, error, warn};
use nohash_hasher::BuildNoHashHasher;

use crate::{
	error::CacheError,
	message::{CompositeKey, Message, Tag},
	transport::Transport,
};

type BlockMap = HashMap<CompositeKey, Message, BuildNoHashHasher<CompositeKey>>;

/// Runs on every worker rank (`rank >= 1`). Holds exactly the blocks this
/// rank owns under [`crate::topology::owner_rank`].
pub struct WorkerLoop<T: Transport> {
	transport: T,
	store: BlockMap,
}

impl<T: Transport> WorkerLoop<T> {
	#[must_use]
	pub fn new(transport: T) -> Self {
		WorkerLoop {
			transport,
			store: HashMap::with_hasher(BuildNoHashHasher::default()),
		}
	}

	/// Number of blocks currently held by this worker.
	#[must_use]
	pub fn len(&self) -> usize {
		self.store.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.store.is_empty()
	}

	#[must_use]
	pub fn contains(&self, key: CompositeKey) -> bool {
		self.store.contains_key(&key)
	}

	/// Runs the message-driven loop until a `Finish` frame arrives, or the
	/// transport fails fatally.
	pub fn run(&mut self) -> Result<(), CacheError> {
		loop {
			let msg = self.transport.recv(None)?;

			match msg.tag() {
				Tag::Finish => {
					debug!("worker rank {} received FINISH, shutting down", self.transport.rank());
					return Ok(());
				},

				Tag::StoreBlock => self.handle_store(msg),
				Tag::GetBlock => self.handle_get(msg)?,
				Tag::EraseBlock => self.handle_erase(msg),

				other => {
					error!("worker rank {} received unhandled tag {other:?}", self.transport.rank());
					return Err(CacheError::InvalidTag);
				},
			}
		}
	}

	fn handle_store(&mut self, msg: Message) {
		let key = msg.key();
		let owned = if msg.owns_buffer() { msg } else { msg.clone_owned() };

		self.store.insert(key, owned);
	}

	fn handle_get(&mut self, msg: Message) -> Result<(), CacheError> {
		let key = msg.key();
		let header = msg.header();

		match self.store.get(&key) {
			Some(block) => {
				let reply = Message::with_payload(
					Tag::StoreBlock,
					self.transport.rank(),
					header.structure_id,
					header.block_id,
					block.payload(),
				);

				self.transport.send(reply, header.source_rank)
			},

			None => {
				// chosen resolution of the open question in the design
				// notes: reply explicitly rather than leaving the manager
				// blocked in recv() forever.
				warn!(
					"worker rank {} missed GET_BLOCK for ({}, {})",
					self.transport.rank(), header.structure_id, header.block_id,
				);

				let reply = Message::create(
					0,
					Tag::BlockNotFound,
					self.transport.rank(),
					header.structure_id,
					header.block_id,
				);

				self.transport.send(reply, header.source_rank)
			},
		}
	}

	fn handle_erase(&mut self, msg: Message) {
		self.store.remove(&msg.key());
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::transport::ChannelTransport;

	#[test]
	fn it_stores_and_serves_a_block() {
		let mut fabric = ChannelTransport::fabric(2);
		let worker_transport = fabric.pop().unwrap();
		let manager_transport = fabric.pop().unwrap();

		let mut worker = WorkerLoop::new(worker_transport);

		let store_msg = Message::with_payload(Tag::StoreBlock, 0, 1, 5, &[9, 9, 9, 9]);
		manager_transport.send(store_msg, 1).unwrap();

		let get_msg = Message::create(0, Tag::GetBlock, 0, 1, 5);
		manager_transport.send(get_msg, 1).unwrap();

		let finish = Message::create(0, Tag::Finish, 0, 0, 0);
		manager_transport.send(finish, 1).unwrap();

		worker.run().unwrap();

		assert_eq!(worker.len(), 1);

		let reply = manager_transport.recv(Some(1)).unwrap();
		assert_eq!(reply.tag(), Tag::StoreBlock);
		assert_eq!(reply.payload(), &[9, 9, 9, 9]);
	}

	#[test]
	fn it_replies_block_not_found_on_a_miss() {
		let mut fabric = ChannelTransport::fabric(2);
		let worker_transport = fabric.pop().unwrap();
		let manager_transport = fabric.pop().unwrap();

		let mut worker = WorkerLoop::new(worker_transport);

		manager_transport.send(Message::create(0, Tag::GetBlock, 0, 1, 5), 1).unwrap();
		manager_transport.send(Message::create(0, Tag::Finish, 0, 0, 0), 1).unwrap();

		worker.run().unwrap();

		let reply = manager_transport.recv(Some(1)).unwrap();
		assert_eq!(reply.tag(), Tag::BlockNotFound);
	}

	#[test]
	fn it_erases_a_stored_block() {
		let mut fabric = ChannelTransport::fabric(2);
		let worker_transport = fabric.pop().unwrap();
		let manager_transport = fabric.pop().unwrap();

		let mut worker = WorkerLoop::new(worker_transport);

		manager_transport.send(Message::with_payload(Tag::StoreBlock, 0, 1, 5, &[1]), 1).unwrap();
		manager_transport.send(Message::create(0, Tag::EraseBlock, 0, 1, 5), 1).unwrap();
		manager_transport.send(Message::create(0, Tag::Finish, 0, 0, 0), 1).unwrap();

		worker.run().unwrap();

		assert!(worker.is_empty());
	}
}
