/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! A distributed, block-addressed cache: one manager node exposes an
//! indexed sequence (and a sorted-map overlay) to callers, backed by a
//! fleet of worker nodes that each hold the blocks deterministically
//! assigned to their rank.

pub mod error;
pub mod config;
pub mod topology;
pub mod message;
pub mod transport;
pub mod worker;
pub mod policy;
pub mod cache;
pub mod manager;
pub mod stats;
pub mod sequence;
pub mod map;

pub use crate::{
	config::Config,
	error::CacheError,
	manager::CacheManager,
	map::SortedMap,
	message::{Message, Tag},
	policy::Policy,
	sequence::{Backward, Forward, NoPrefetch, PrefetchStrategy, Sequence},
	stats::Stats,
	topology::{owner_rank, MANAGER_RANK},
	transport::{ChannelTransport, Transport},
	worker::WorkerLoop,
};
