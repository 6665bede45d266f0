/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! End-to-end scenarios driven over an in-process [`ChannelTransport`]
//! fleet: the sequence container talking to a manager talking to real
//! worker loops on their own threads, not just the manager's internal
//! bookkeeping in isolation. The LFU tie-break and pseudo-LRU sweep
//! scenarios are covered at the policy level in
//! `src/policy/{lfu,plru}.rs`'s own unit tests instead of here, since they
//! exercise eviction-policy semantics rather than the container contract.

use meshcache::{
	config::Config,
	manager::CacheManager,
	message::HEADER_SIZE,
	policy::Policy,
	sequence::{Forward, NoPrefetch, Sequence},
	transport::{ChannelTransport, Transport},
	worker::WorkerLoop,
};

const WORLD_SIZE: u32 = 13;
const BLOCK_SIZE: usize = 32; // bytes; T = i32, epb = 8

fn spawn_world(capacity_blocks: u64) -> (CacheManager<ChannelTransport>, Vec<std::thread::JoinHandle<()>>) {
	let mut fabric = ChannelTransport::fabric(WORLD_SIZE);
	let manager_transport = fabric.remove(0);

	let threads = fabric.into_iter()
		.map(|transport| std::thread::spawn(move || {
			WorkerLoop::new(transport).run().unwrap();
		}))
		.collect();

	let capacity_bytes = capacity_blocks * (HEADER_SIZE as u64 + BLOCK_SIZE as u64);
	let config = Config::new(capacity_bytes, Policy::Lru, BLOCK_SIZE as u64, WORLD_SIZE).unwrap();

	(CacheManager::new(manager_transport, config).unwrap(), threads)
}

fn shut_down(manager: &CacheManager<ChannelTransport>, threads: Vec<std::thread::JoinHandle<()>>) {
	manager.finalize().unwrap();

	for thread in threads {
		thread.join().unwrap();
	}
}

/// Scenario 1: round-trip, single block — `B = 32` bytes, `T = i32`
/// (epb = 8), cache capacity = 3 blocks.
#[test]
fn scenario_1_round_trip_fills_exactly_three_resident_blocks() {
	let (manager, threads) = spawn_world(3);
	let mut seq: Sequence<i32, BLOCK_SIZE, ChannelTransport> = Sequence::new(manager, 0);

	for value in 0..100i32 {
		seq.push_back(value).unwrap();
	}

	assert_eq!(seq.len(), 100);
	assert_eq!(seq.at(0).unwrap(), 0);
	assert_eq!(seq.at(99).unwrap(), 99);

	let resident = seq.manager().resident_block_ids(0);
	assert_eq!(resident, [10, 11, 12].into_iter().collect());

	shut_down(seq.manager(), threads);
}

/// Scenario 2: LRU eviction. After scenario 1, reading `at(0)` pulls block
/// 0 back in, evicting the least-recently-used resident block (10).
#[test]
fn scenario_2_reading_the_oldest_key_evicts_the_lru_resident_block() {
	let (manager, threads) = spawn_world(3);
	let mut seq: Sequence<i32, BLOCK_SIZE, ChannelTransport> = Sequence::new(manager, 0);

	for value in 0..100i32 {
		seq.push_back(value).unwrap();
	}

	assert_eq!(seq.at(0).unwrap(), 0);

	let resident = seq.manager().resident_block_ids(0);
	assert_eq!(resident, [0, 11, 12].into_iter().collect());

	shut_down(seq.manager(), threads);
}

/// Scenario 3: insert-in-middle.
#[test]
fn scenario_3_insert_in_the_middle_shifts_the_tail_forward() {
	let (manager, threads) = spawn_world(3);
	let mut seq: Sequence<i32, BLOCK_SIZE, ChannelTransport> = Sequence::new(manager, 0);

	for value in 0..100i32 {
		seq.push_back(value).unwrap();
	}

	seq.insert(50, 999).unwrap();

	assert_eq!(seq.len(), 101);
	assert_eq!(seq.at(50).unwrap(), 999);

	for i in 0..50u64 {
		assert_eq!(seq.at(i).unwrap(), i as i32);
	}

	for i in 51..=100u64 {
		assert_eq!(seq.at(i).unwrap(), (i - 1) as i32);
	}

	shut_down(seq.manager(), threads);
}

/// Scenario 4: erase-in-middle, continuing from scenario 3.
#[test]
fn scenario_4_erase_in_the_middle_restores_the_original_sequence() {
	let (manager, threads) = spawn_world(3);
	let mut seq: Sequence<i32, BLOCK_SIZE, ChannelTransport> = Sequence::new(manager, 0);

	for value in 0..100i32 {
		seq.push_back(value).unwrap();
	}

	seq.insert(50, 999).unwrap();
	seq.erase(50).unwrap();

	assert_eq!(seq.len(), 100);

	for i in 0..100u64 {
		assert_eq!(seq.at(i).unwrap(), i as i32);
	}

	shut_down(seq.manager(), threads);
}

/// Quantified property: prefetch is transparent. The same sequential scan
/// produces identical results whether or not a forward read-ahead is
/// configured.
#[test]
fn prefetch_does_not_change_scan_results() {
	let (manager_plain, threads_plain) = spawn_world(3);
	let mut plain: Sequence<i32, BLOCK_SIZE, ChannelTransport, NoPrefetch> = Sequence::new(manager_plain, 0);

	let (manager_prefetching, threads_prefetching) = spawn_world(3);
	let mut prefetching: Sequence<i32, BLOCK_SIZE, ChannelTransport, Forward<2>> = Sequence::new(manager_prefetching, 0);

	for value in 0..40i32 {
		plain.push_back(value).unwrap();
		prefetching.push_back(value).unwrap();
	}

	let plain_values: Vec<i32> = (0..plain.len()).map(|i| plain.at(i).unwrap()).collect();
	let prefetching_values: Vec<i32> = (0..prefetching.len()).map(|i| prefetching.at(i).unwrap()).collect();

	assert_eq!(plain_values, prefetching_values);

	shut_down(plain.manager(), threads_plain);
	shut_down(prefetching.manager(), threads_prefetching);
}
