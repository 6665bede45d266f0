/*
 * Copyright (c) Kia Shakiba
 *
 * This source code is licensed under the GNU AGPLv3 license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The wire frame every participant sends and receives: a fixed 20-byte
//! header followed by an opaque payload, one contiguous allocation per
//! frame.

use std::io::{self, Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::CacheError;

/// Fixed header size in bytes: `tag(1) + pad(3) + source_rank(4) +
/// structure_id(4) + block_id(4) + payload_size(4)`.
pub const HEADER_SIZE: usize = 20;

/// The 64-bit key `(structure_id, block_id)` packs into, used everywhere a
/// block needs to be addressed in a single map lookup.
pub type CompositeKey = u64;

/// Packs `(structure_id, block_id)` into the composite key used by the
/// cache core and every eviction policy.
#[must_use]
pub fn composite_key(structure_id: u32, block_id: u32) -> CompositeKey {
	(u64::from(structure_id) << 32) | u64::from(block_id)
}

/// Splits a composite key back into `(structure_id, block_id)`.
#[must_use]
pub fn split_key(key: CompositeKey) -> (u32, u32) {
	((key >> 32) as u32, (key & 0xFFFF_FFFF) as u32)
}

/// Message tags. `Invalid` exists only as a sentinel a conforming receiver
/// never produces; seeing it on the wire is a programmer error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Tag {
	StoreBlock = 1,
	GetBlock = 2,
	EraseBlock = 3,
	BlockNotFound = 4,
	Finish = 5,
	Invalid = 0,
}

impl Tag {
	fn from_byte(byte: u8) -> Tag {
		match byte {
			1 => Tag::StoreBlock,
			2 => Tag::GetBlock,
			3 => Tag::EraseBlock,
			4 => Tag::BlockNotFound,
			5 => Tag::Finish,
			_ => Tag::Invalid,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
	pub tag: Tag,
	pub source_rank: u32,
	pub structure_id: u32,
	pub block_id: u32,
	pub payload_size: u32,
}

impl Header {
	fn write(&self, out: &mut impl Write) -> io::Result<()> {
		out.write_u8(self.tag as u8)?;
		out.write_all(&[0, 0, 0])?;
		out.write_u32::<LittleEndian>(self.source_rank)?;
		out.write_u32::<LittleEndian>(self.structure_id)?;
		out.write_u32::<LittleEndian>(self.block_id)?;
		out.write_u32::<LittleEndian>(self.payload_size)
	}

	fn read(buf: &mut impl Read) -> io::Result<Self> {
		let tag = Tag::from_byte(buf.read_u8()?);
		let mut pad = [0u8; 3];
		buf.read_exact(&mut pad)?;

		Ok(Header {
			tag,
			source_rank: buf.read_u32::<LittleEndian>()?,
			structure_id: buf.read_u32::<LittleEndian>()?,
			block_id: buf.read_u32::<LittleEndian>()?,
			payload_size: buf.read_u32::<LittleEndian>()?,
		})
	}
}

/// Whether a [`Message`] owns its backing buffer or borrows someone else's.
enum Buffer {
	Owned(Vec<u8>),
	Borrowed(Vec<u8>),
}

impl Buffer {
	fn as_slice(&self) -> &[u8] {
		match self {
			Buffer::Owned(buf) | Buffer::Borrowed(buf) => buf,
		}
	}

	fn as_mut_slice(&mut self) -> &mut [u8] {
		match self {
			Buffer::Owned(buf) | Buffer::Borrowed(buf) => buf,
		}
	}
}

/// A single self-describing frame: header plus payload, one allocation.
/// Reads always go through [`Message::header`] / [`Message::payload`]
/// regardless of whether the buffer is owned or borrowed.
pub struct Message {
	buffer: Buffer,
}

impl Message {
	/// Allocates a fresh, zeroed payload of `payload_size` bytes and wraps
	/// it with the given header fields. Always owns its buffer.
	#[must_use]
	pub fn create(
		payload_size: u32,
		tag: Tag,
		source_rank: u32,
		structure_id: u32,
		block_id: u32,
	) -> Self {
		let header = Header { tag, source_rank, structure_id, block_id, payload_size };
		let mut buf = Vec::with_capacity(HEADER_SIZE + payload_size as usize);

		header.write(&mut buf).expect("writing to a Vec cannot fail");
		buf.resize(HEADER_SIZE + payload_size as usize, 0);

		Message { buffer: Buffer::Owned(buf) }
	}

	/// Builds a message whose payload is the given bytes, e.g. to ship a
	/// just-evicted block verbatim to its owning worker.
	#[must_use]
	pub fn with_payload(
		tag: Tag,
		source_rank: u32,
		structure_id: u32,
		block_id: u32,
		payload: &[u8],
	) -> Self {
		let mut msg = Message::create(payload.len() as u32, tag, source_rank, structure_id, block_id);
		msg.payload_mut().copy_from_slice(payload);
		msg
	}

	/// Type-puns an externally owned receive buffer into a borrowed
	/// message. The caller must ensure `buf` holds a valid encoded frame.
	pub fn wrap(buf: Vec<u8>) -> Result<Self, CacheError> {
		if buf.len() < HEADER_SIZE {
			return Err(CacheError::Internal("buffer too small to contain a header"));
		}

		Ok(Message { buffer: Buffer::Borrowed(buf) })
	}

	/// Deep-copies `self`; the clone always owns its buffer, matching
	/// `storeCacheBlock`'s "clone if borrowed before admitting" behaviour.
	#[must_use]
	pub fn clone_owned(&self) -> Self {
		Message { buffer: Buffer::Owned(self.buffer.as_slice().to_vec()) }
	}

	/// Whether this message owns its backing buffer.
	#[must_use]
	pub fn owns_buffer(&self) -> bool {
		matches!(self.buffer, Buffer::Owned(_))
	}

	#[must_use]
	pub fn header(&self) -> Header {
		Header::read(&mut Cursor::new(self.buffer.as_slice()))
			.expect("a constructed Message always has a valid header")
	}

	#[must_use]
	pub fn tag(&self) -> Tag {
		self.header().tag
	}

	/// `(structure_id << 32) | block_id`.
	#[must_use]
	pub fn key(&self) -> CompositeKey {
		let header = self.header();
		composite_key(header.structure_id, header.block_id)
	}

	#[must_use]
	pub fn payload(&self) -> &[u8] {
		&self.buffer.as_slice()[HEADER_SIZE..]
	}

	pub fn payload_mut(&mut self) -> &mut [u8] {
		&mut self.buffer.as_mut_slice()[HEADER_SIZE..]
	}

	/// Total serialized size (header + payload) used for byte accounting
	/// by the cache core.
	#[must_use]
	pub fn size(&self) -> u64 {
		self.buffer.as_slice().len() as u64
	}

	/// Serializes this message into a flat byte vector suitable for
	/// sending over any transport.
	#[must_use]
	pub fn to_bytes(&self) -> Vec<u8> {
		self.buffer.as_slice().to_vec()
	}

	/// Builds a borrowed `Message` from bytes just read off the wire.
	pub fn from_bytes(buf: Vec<u8>) -> Result<Self, CacheError> {
		Message::wrap(buf)
	}
}
