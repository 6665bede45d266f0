/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The indexed sequence container: a flat, block-addressed
//! `Vec<T>`-alike whose elements live behind the distributed cache instead
//! of in local memory. `B` is the block size in bytes, fixed at the type
//! level so index-to-block arithmetic is a shift and a mask rather than a
//! division; `S` picks a read-ahead strategy, defaulting to none.

mod prefetch;
mod iter;

pub use prefetch::{PrefetchStrategy, NoPrefetch, Forward, Backward};
pub use iter::Iter;

use std::mem;

use crate::{
	error::CacheError,
	manager::CacheManager,
	message::{Message, Tag},
	transport::{RecvHandle, Transport},
};

/// A block-addressed, randomly-indexable sequence of `T`, backed by a
/// [`CacheManager`]. `T` must be plain, fixed-layout data — the container
/// reinterprets a block's bytes directly as `[T; elements_per_block]`, the
/// same raw-memory-block model a fixed-layout vector would use over a
/// byte buffer.
pub struct Sequence<T, const B: usize, Tr: Transport, S: PrefetchStrategy = NoPrefetch> {
	manager: CacheManager<Tr>,
	structure_id: u32,
	len: u64,
	elements_per_block: usize,
	pending_prefetch: Option<(u32, RecvHandle)>,
	_strategy: std::marker::PhantomData<S>,
	_element: std::marker::PhantomData<T>,
}

impl<T, const B: usize, Tr: Transport, S: PrefetchStrategy> Sequence<T, B, Tr, S>
where
	T: Copy + Default,
{
	/// Builds an empty sequence identified by `structure_id` (distinct
	/// sequences sharing one fleet of workers use distinct ids so their
	/// composite keys never collide).
	///
	/// # Panics
	///
	/// Panics if `B` is not a power of two, or does not evenly divide into
	/// a whole, power-of-two number of elements — both are programmer
	/// errors fixed at the call site, not runtime conditions.
	#[must_use]
	pub fn new(manager: CacheManager<Tr>, structure_id: u32) -> Self {
		assert!(B.is_power_of_two(), "block size B must be a power of two");

		let element_size = mem::size_of::<T>();
		assert!(element_size > 0, "a zero-sized element type cannot be block-addressed");
		assert!(B % element_size == 0, "B must divide evenly into elements of size {element_size}");

		let elements_per_block = B / element_size;
		assert!(elements_per_block.is_power_of_two(), "elements per block must be a power of two for shift/mask indexing");

		Sequence {
			manager,
			structure_id,
			len: 0,
			elements_per_block,
			pending_prefetch: None,
			_strategy: std::marker::PhantomData,
			_element: std::marker::PhantomData,
		}
	}

	#[must_use]
	pub fn len(&self) -> u64 {
		self.len
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len == 0
	}

	#[must_use]
	pub fn manager(&self) -> &CacheManager<Tr> {
		&self.manager
	}

	fn shift(&self) -> u32 {
		self.elements_per_block.trailing_zeros()
	}

	fn block_of(&self, index: u64) -> (u32, usize) {
		let block_id = (index >> self.shift()) as u32;
		let offset = (index & (self.elements_per_block as u64 - 1)) as usize;
		(block_id, offset)
	}

	fn block_count(&self) -> u32 {
		if self.len == 0 {
			return 0;
		}

		(((self.len - 1) >> self.shift()) + 1) as u32
	}

	/// Returns the element at `index`, fetching its block from the owning
	/// worker on a local miss.
	pub fn at(&mut self, index: u64) -> Result<T, CacheError> {
		if index >= self.len {
			return Err(CacheError::IndexOutOfRange { index, len: self.len });
		}

		let (block_id, offset) = self.block_of(index);
		let message = self.fetch_block(block_id)?;
		let elements = decode_block::<T>(message.payload(), self.elements_per_block);

		self.maybe_prefetch(block_id, offset);

		Ok(elements[offset])
	}

	/// Overwrites the element at `index`.
	pub fn set(&mut self, index: u64, value: T) -> Result<(), CacheError> {
		if index >= self.len {
			return Err(CacheError::IndexOutOfRange { index, len: self.len });
		}

		let (block_id, offset) = self.block_of(index);
		let message = self.fetch_block(block_id)?;
		let mut elements = decode_block::<T>(message.payload(), self.elements_per_block);
		elements[offset] = value;

		self.write_block(block_id, &elements)?;
		self.maybe_prefetch(block_id, offset);

		Ok(())
	}

	/// Appends `value` to the end of the sequence, allocating a fresh block
	/// if `len` currently sits on a block boundary.
	pub fn push_back(&mut self, value: T) -> Result<(), CacheError> {
		let index = self.len;
		let (block_id, offset) = self.block_of(index);

		let mut elements = if offset == 0 {
			vec![T::default(); self.elements_per_block]
		} else {
			let message = self.fetch_block(block_id)?;
			decode_block::<T>(message.payload(), self.elements_per_block)
		};

		elements[offset] = value;
		self.write_block(block_id, &elements)?;
		self.len += 1;

		Ok(())
	}

	/// Inserts `value` at `index`, shifting every later element one slot
	/// forward. Grows the sequence by one first, then shifts back-to-front
	/// so no element is overwritten before it has been read.
	pub fn insert(&mut self, index: u64, value: T) -> Result<(), CacheError> {
		if index > self.len {
			return Err(CacheError::IndexOutOfRange { index, len: self.len });
		}

		self.push_back(T::default())?;

		let mut cursor = self.len - 1;

		while cursor > index {
			let previous = self.at(cursor - 1)?;
			self.set(cursor, previous)?;
			cursor -= 1;
		}

		self.set(index, value)
	}

	/// Removes the element at `index`, shifting every later element one
	/// slot back in a single pass — unlike a swap-based double shift,
	/// each slot is written exactly once.
	pub fn erase(&mut self, index: u64) -> Result<T, CacheError> {
		if index >= self.len {
			return Err(CacheError::IndexOutOfRange { index, len: self.len });
		}

		let removed = self.at(index)?;

		for cursor in index..self.len - 1 {
			let next = self.at(cursor + 1)?;
			self.set(cursor, next)?;
		}

		self.len -= 1;

		Ok(removed)
	}

	/// Swaps the elements at `i` and `j`.
	pub fn swap(&mut self, i: u64, j: u64) -> Result<(), CacheError> {
		if i == j {
			return Ok(());
		}

		let a = self.at(i)?;
		let b = self.at(j)?;

		self.set(i, b)?;
		self.set(j, a)
	}

	/// Empties the sequence. Blocks already shipped to workers are left in
	/// place rather than eagerly erased there; they are simply never
	/// addressed again once `len` is zero.
	pub fn clear(&mut self) {
		self.len = 0;
		self.pending_prefetch = None;
	}

	/// Iterates the sequence front-to-back.
	pub fn iter(&mut self) -> Iter<'_, T, B, Tr, S> {
		Iter::new(self)
	}

	fn fetch_block(&mut self, block_id: u32) -> Result<Message, CacheError> {
		let matches_pending = matches!(&self.pending_prefetch, Some((pending, _)) if *pending == block_id);

		if matches_pending {
			let (_, handle) = self.pending_prefetch.take().unwrap();
			return self.manager.consume_prefetch(self.structure_id, block_id, handle);
		}

		self.manager.get_block_or_fetch(self.structure_id, block_id)
	}

	fn write_block(&mut self, block_id: u32, elements: &[T]) -> Result<(), CacheError> {
		let bytes = encode_block(elements);
		let message = Message::with_payload(Tag::StoreBlock, 0, self.structure_id, block_id, &bytes);

		self.manager.store_block(self.structure_id, block_id, message)
	}

	fn maybe_prefetch(&mut self, block_id: u32, offset: usize) {
		if self.pending_prefetch.is_some() {
			return;
		}

		let Some(target) = S::next_block_to_prefetch(offset, self.elements_per_block, block_id, self.block_count()) else {
			return;
		};

		if self.manager.contains_locally(self.structure_id, target) {
			return;
		}

		if let Ok(handle) = self.manager.prefetch(self.structure_id, target) {
			self.pending_prefetch = Some((target, handle));
		}
	}
}

/// Reinterprets `elements` as raw bytes. `T` is required to be `Copy`,
/// ruling out types with drop glue or interior pointers.
fn encode_block<T: Copy>(elements: &[T]) -> Vec<u8> {
	let byte_len = std::mem::size_of_val(elements);

	unsafe {
		std::slice::from_raw_parts(elements.as_ptr().cast::<u8>(), byte_len).to_vec()
	}
}

/// Inverse of [`encode_block`]: reconstructs `count` elements of `T` from
/// a block's raw bytes.
fn decode_block<T: Copy + Default>(bytes: &[u8], count: usize) -> Vec<T> {
	let mut elements = vec![T::default(); count];
	let byte_len = std::mem::size_of_val(elements.as_slice());

	debug_assert_eq!(bytes.len(), byte_len, "a block's payload must match its declared element layout");

	unsafe {
		std::ptr::copy_nonoverlapping(bytes.as_ptr(), elements.as_mut_ptr().cast::<u8>(), byte_len);
	}

	elements
}

impl<T, const B: usize, Tr: Transport, S: PrefetchStrategy> Sequence<T, B, Tr, S>
where
	T: Copy + Default + Ord,
{
	/// Sorts the sequence in place over `[0, len)`. A recursive merge sort
	/// whose merge step shifts elements directly through `at`/`set` rather
	/// than gathering into an auxiliary buffer — every element it touches
	/// still goes through the same block budget as any other read or
	/// write, it just costs O(n^2) shifting in the worst case to avoid
	/// materializing the whole sequence locally.
	pub fn sort(&mut self) -> Result<(), CacheError> {
		self.merge_sort(0, self.len)
	}

	fn merge_sort(&mut self, lo: u64, hi: u64) -> Result<(), CacheError> {
		if hi - lo <= 1 {
			return Ok(());
		}

		let mid = lo + (hi - lo) / 2;

		self.merge_sort(lo, mid)?;
		self.merge_sort(mid, hi)?;
		self.merge(lo, mid, hi)
	}

	/// Merges the two already-sorted runs `[lo, mid)` and `[mid, hi)` by
	/// rotating a single out-of-place element into the first run via
	/// element-by-element shifting, instead of merging into a second
	/// buffer.
	fn merge(&mut self, lo: u64, mid: u64, hi: u64) -> Result<(), CacheError> {
		let mut i = lo;
		let mut j = mid;

		while i < j && j < hi {
			if self.at(i)? <= self.at(j)? {
				i += 1;
				continue;
			}

			let displaced = self.at(j)?;
			let mut k = j;

			while k > i {
				let previous = self.at(k - 1)?;
				self.set(k, previous)?;
				k -= 1;
			}

			self.set(i, displaced)?;
			i += 1;
			j += 1;
		}

		Ok(())
	}
}
