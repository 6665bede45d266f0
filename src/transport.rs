/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The transport primitive itself is an external collaborator: this crate
//! only requires reliable, ordered, point-to-point delivery with
//! source/tag matching. [`Transport`] names that contract; [`ChannelTransport`]
//! is a reference implementation over `crossbeam-channel`, one OS thread per
//! simulated rank, used by the worker loop's tests and by `tests/scenarios.rs`.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::{error::CacheError, message::Message};

/// A handle to an in-flight non-blocking receive, returned by
/// [`Transport::recv_nonblocking_begin`] and consumed by
/// [`Transport::recv_wait`]. Identifies the source to wait on rather than
/// an independent delivery path, so it composes with whatever buffering
/// the transport's own selective `recv` already does.
pub struct RecvHandle {
	src: u32,
}

/// Reliable, ordered, point-to-point message delivery between ranks.
///
/// Ordering is guaranteed per `(source, dest, tag)` pair,
/// and any transport failure is fatal for the run — implementations should
/// never swallow an error; surface it as [`CacheError::TransportFatal`].
pub trait Transport: Send {
	/// This participant's own rank.
	fn rank(&self) -> u32;

	/// Total participant count (manager + workers).
	fn world_size(&self) -> u32;

	/// Reliably sends `msg` to `dest_rank`.
	fn send(&self, msg: Message, dest_rank: u32) -> Result<(), CacheError>;

	/// Blocks until a matching frame arrives from `src` (any source if
	/// `None`) and returns it. A frame from a non-matching source that
	/// arrives first must not be dropped — implementations have to hold
	/// it for a later receive, selective or not, to still find.
	fn recv(&self, src: Option<u32>) -> Result<Message, CacheError>;

	/// Begins a non-blocking receive from `src`, returning a handle to
	/// poll or wait on later (used for prefetch pipelining).
	fn recv_nonblocking_begin(&self, src: u32) -> Result<RecvHandle, CacheError>;

	/// Blocks on a previously started non-blocking receive. Delegates to
	/// `recv(Some(src))` so it shares the same buffering a direct
	/// selective receive would.
	fn recv_wait(&self, handle: RecvHandle) -> Result<Message, CacheError> {
		self.recv(Some(handle.src))
	}
}

/// An in-process [`Transport`] built on `crossbeam-channel`: each rank is a
/// plain `Sender`/`Receiver` pair in a shared routing table. This follows
/// a thread-per-worker idiom, just applied to whole simulated participants
/// instead of one process's internal workers.
///
/// `inbox` is only ever drained from the owning rank's own thread, so the
/// `pending` buffer of messages read off `inbox` but not yet matched by a
/// selective receive is a plain `RefCell`, not a mutex.
pub struct ChannelTransport {
	rank: u32,
	world_size: u32,
	inbox: Receiver<Message>,
	outboxes: Arc<[Sender<Message>]>,
	pending: std::cell::RefCell<std::collections::VecDeque<Message>>,
}

impl ChannelTransport {
	/// Builds one [`ChannelTransport`] per rank in `0..world_size`, wired
	/// so that every pair can reach each other. Rank 0 is the manager.
	#[must_use]
	pub fn fabric(world_size: u32) -> Vec<ChannelTransport> {
		let (senders, receivers): (Vec<_>, Vec<_>) = (0..world_size)
			.map(|_| unbounded::<Message>())
			.map(|(tx, rx)| (tx, rx))
			.unzip();

		let outboxes: Arc<[Sender<Message>]> = senders.into();

		receivers.into_iter()
			.enumerate()
			.map(|(rank, inbox)| ChannelTransport {
				rank: rank as u32,
				world_size,
				inbox,
				outboxes: outboxes.clone(),
				pending: std::cell::RefCell::new(std::collections::VecDeque::new()),
			})
			.collect()
	}
}

impl Transport for ChannelTransport {
	fn rank(&self) -> u32 {
		self.rank
	}

	fn world_size(&self) -> u32 {
		self.world_size
	}

	fn send(&self, msg: Message, dest_rank: u32) -> Result<(), CacheError> {
		self.outboxes[dest_rank as usize]
			.send(msg)
			.map_err(|_| CacheError::TransportFatal(format!("rank {dest_rank} is gone")))
	}

	fn recv(&self, src: Option<u32>) -> Result<Message, CacheError> {
		match src {
			None => {
				if let Some(msg) = self.pending.borrow_mut().pop_front() {
					return Ok(msg);
				}

				self.inbox.recv()
					.map_err(|_| CacheError::TransportFatal("inbox closed".into()))
			},

			// a source-filtered receive first checks messages already
			// pulled off the inbox by an earlier selective receive that
			// didn't match; anything else it drains past while waiting for
			// `expected_rank` goes back onto that same buffer instead of
			// being dropped, so a later receive (selective or wildcard)
			// can still find it.
			Some(expected_rank) => {
				{
					let mut pending = self.pending.borrow_mut();

					if let Some(pos) = pending.iter().position(|msg| msg.header().source_rank == expected_rank) {
						return Ok(pending.remove(pos).expect("position was just found"));
					}
				}

				loop {
					let msg = self.inbox.recv()
						.map_err(|_| CacheError::TransportFatal("inbox closed".into()))?;

					if msg.header().source_rank == expected_rank {
						return Ok(msg);
					}

					self.pending.borrow_mut().push_back(msg);
				}
			},
		}
	}

	fn recv_nonblocking_begin(&self, src: u32) -> Result<RecvHandle, CacheError> {
		// this reference transport has no real async receive path to kick
		// off; the handle just remembers which source `recv_wait` should
		// later filter for, so the send already issued by the caller (e.g.
		// CacheManager::prefetch) is all the "in-flight" work there is.
		Ok(RecvHandle { src })
	}
}
