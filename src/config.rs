/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

use serde::{Deserialize, Serialize};

use crate::{error::CacheError, policy::Policy};

/// Process-wide configuration, set once before the manager and workers
/// start. None of these fields are mutable for the lifetime of a run except
/// `cache_capacity_bytes`, which the manager exposes through
/// [`crate::manager::CacheManager::resize`]; `eviction_policy` picks the
/// policy the manager cache runs for the whole run and cannot be swapped
/// mid-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
	/// Strict upper bound on the sum of resident-block byte sizes.
	pub cache_capacity_bytes: u64,

	/// The eviction policy the manager cache runs initially.
	pub eviction_policy: Policy,

	/// Default block size, in bytes. Rounded up to the next power of two
	/// by [`crate::sequence::Sequence`] at the type level; this field only
	/// needs to hold a sane default for runtime validation.
	pub default_block_size: u64,

	/// Total participant count, including the manager (rank 0). Supplied
	/// by the transport at start; not configurable afterwards.
	pub participant_count: u32,
}

impl Config {
	/// Builds a [`Config`], validating it per the config-error taxonomy in
	/// the error handling design: a cache smaller than one block, a zero
	/// block size, or fewer than two participants all fail at start.
	pub fn new(
		cache_capacity_bytes: u64,
		eviction_policy: Policy,
		default_block_size: u64,
		participant_count: u32,
	) -> Result<Self, CacheError> {
		if cache_capacity_bytes == 0 {
			return Err(CacheError::ZeroCapacity);
		}

		if default_block_size == 0 {
			return Err(CacheError::ZeroBlockSize);
		}

		if cache_capacity_bytes < default_block_size {
			return Err(CacheError::CapacitySmallerThanBlock {
				capacity: cache_capacity_bytes,
				block_size: default_block_size,
			});
		}

		if participant_count < 2 {
			return Err(CacheError::TooFewParticipants);
		}

		Ok(Config {
			cache_capacity_bytes,
			eviction_policy,
			default_block_size,
			participant_count,
		})
	}

	/// Number of worker ranks (everything but the manager at rank 0).
	#[must_use]
	pub fn worker_count(&self) -> u32 {
		self.participant_count - 1
	}
}
