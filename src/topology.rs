/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Rank assignment. Rank 0 is always the manager; ranks `1..world_size` are
//! workers. Ownership of a block is computed, never stored, so the
//! manager and every worker agree on it by construction.

/// The manager always runs at this rank.
pub const MANAGER_RANK: u32 = 0;

/// Returns the rank of the worker that owns `block_id`, given the total
/// participant count (manager + workers).
///
/// # Panics
///
/// Panics if `world_size < 2`; a [`crate::config::Config`] rejects such a
/// world size before any container can be created, so this is a programmer
/// error rather than a runtime condition callers need to handle.
#[must_use]
pub fn owner_rank(block_id: u32, world_size: u32) -> u32 {
	assert!(world_size >= 2, "a world of fewer than 2 participants has no workers");

	1 + block_id % (world_size - 1)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn it_assigns_owners_round_robin_over_workers() {
		// world_size = 4 -> 3 workers, ranks 1, 2, 3
		assert_eq!(owner_rank(0, 4), 1);
		assert_eq!(owner_rank(1, 4), 2);
		assert_eq!(owner_rank(2, 4), 3);
		assert_eq!(owner_rank(3, 4), 1);
	}

	#[test]
	fn it_spreads_adjacent_block_ids_across_distinct_workers() {
		// keys {10, 11, 12}, world_size large enough that each key maps to
		// a distinct worker.
		let world_size = 13;

		assert_eq!(owner_rank(10, world_size), 1 + 10 % 12);
		assert_eq!(owner_rank(11, world_size), 1 + 11 % 12);
		assert_eq!(owner_rank(12, world_size), 1 + 12 % 12);
	}

	#[test]
	#[should_panic]
	fn it_panics_on_a_world_with_no_workers() {
		owner_rank(0, 1);
	}
}
