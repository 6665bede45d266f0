/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

use thiserror::Error;

/// Every error this crate can produce.
///
/// Nothing in this crate retries an error at this layer: programmer errors
/// and transport-fatal errors abort the run, config errors fail at start.
#[derive(Debug, PartialEq, Error)]
pub enum CacheError {
	#[error("the cache capacity cannot be zero")]
	ZeroCapacity,

	#[error("the cache capacity ({capacity}) must be at least one block ({block_size})")]
	CapacitySmallerThanBlock { capacity: u64, block_size: u64 },

	#[error("the default block size cannot be zero")]
	ZeroBlockSize,

	#[error("the participant count must be at least 2 (one manager, one worker)")]
	TooFewParticipants,

	#[error("a block of size {size} cannot exceed the cache capacity {capacity}")]
	BlockExceedsCapacity { size: u64, capacity: u64 },

	#[error("block ({structure_id}, {block_id}) was not found")]
	BlockNotFound { structure_id: u32, block_id: u32 },

	#[error("index {index} is out of range for a sequence of length {len}")]
	IndexOutOfRange { index: u64, len: u64 },

	#[error("the transport reported a fatal error: {0}")]
	TransportFatal(String),

	#[error("received an unexpected or invalid message tag")]
	InvalidTag,

	#[error("an internal invariant was violated: {0}")]
	Internal(&'static str),
}
