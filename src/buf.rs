/*!
# Growable byte buffers with deferred reclaim

This module provides [`ByteBuffer`], the owned byte store used for decoded
document text inside input frames. The buffer keeps a logical start offset so
that consumed bytes can be dropped in O(1) and reclaimed lazily when the
buffer has to grow anyway.
*/
use crate::error::BufError;

/// Minimum number of bytes by which a buffer grows.
const MIN_GROWTH: usize = 256;

/// Number of consumed bytes after which an append compacts the buffer even
/// if no growth is necessary.
const RECLAIM_THRESHOLD: usize = 4096;

/// Growable byte store with a logical start offset and a capacity limit.
///
/// The buffer guarantees that a NUL byte follows the live data at all times,
/// so that `as_slice().as_ptr()` can be handed to NUL-terminated consumers
/// without a copy. The terminator is not part of the data and not included
/// in [`ByteBuffer::len()`].
///
/// Buffers created via [`ByteBuffer::from_slice`] with `static_` set are
/// read-only: any mutating operation fails with
/// [`BufError::StaticBufferMutation`].
#[derive(Debug, Clone)]
pub struct ByteBuffer {
	/// Backing storage. Live data is `content[offset..content.len() - 1]`,
	/// the final byte is always the NUL terminator.
	content: Vec<u8>,
	offset: usize,
	max_capacity: usize,
	static_: bool,
	detached: bool,
}

impl ByteBuffer {
	/// Create an empty buffer which may hold up to `max_capacity` bytes of
	/// data.
	pub fn new(max_capacity: usize) -> ByteBuffer {
		let mut content = Vec::with_capacity(MIN_GROWTH.min(max_capacity.saturating_add(1)));
		content.push(0u8);
		ByteBuffer {
			content,
			offset: 0,
			max_capacity,
			static_: false,
			detached: false,
		}
	}

	/// Create a buffer holding a copy of `data`.
	///
	/// If `static_` is true, the buffer is read-only afterwards; this is
	/// used for entity replacement text, which never changes after the
	/// declaration has been parsed.
	pub fn from_slice(data: &[u8], static_: bool) -> ByteBuffer {
		let mut content = Vec::with_capacity(data.len() + 1);
		content.extend_from_slice(data);
		content.push(0u8);
		ByteBuffer {
			content,
			offset: 0,
			max_capacity: data.len(),
			static_,
			detached: false,
		}
	}

	/// Number of live data bytes.
	pub fn len(&self) -> usize {
		self.content.len() - 1 - self.offset
	}

	/// True if no live data is in the buffer.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Number of data bytes which may still be appended before the capacity
	/// limit is hit.
	pub fn available_capacity(&self) -> usize {
		self.max_capacity - self.len().min(self.max_capacity)
	}

	/// Access the live data.
	pub fn as_slice(&self) -> &[u8] {
		&self.content[self.offset..self.content.len() - 1]
	}

	fn check_mutable(&self) -> Result<(), BufError> {
		if self.static_ {
			Err(BufError::StaticBufferMutation)
		} else {
			Ok(())
		}
	}

	/// Move the live data back to the start of the backing storage,
	/// reclaiming the consumed region.
	fn compact(&mut self) {
		if self.offset == 0 {
			return;
		}
		let end = self.content.len();
		self.content.copy_within(self.offset..end, 0);
		self.content.truncate(end - self.offset);
		self.offset = 0;
	}

	/// Ensure that at least `additional` more data bytes can be appended.
	///
	/// Consumed bytes are reclaimed first; only if that does not yield
	/// enough room is the backing storage grown. Growth at least doubles
	/// the storage to keep appends amortized O(1).
	pub fn reserve(&mut self, additional: usize) -> Result<(), BufError> {
		self.check_mutable()?;
		let len = self.len();
		if additional > self.max_capacity - len.min(self.max_capacity) {
			return Err(BufError::CapacityExceeded);
		}
		// +1 for the terminator
		let needed = len + additional + 1;
		if self.content.capacity() >= needed + self.offset && self.offset < RECLAIM_THRESHOLD {
			return Ok(());
		}
		self.compact();
		if self.content.capacity() < needed {
			let target = needed
				.max(self.content.capacity() * 2)
				.max(MIN_GROWTH)
				.min(self.max_capacity + 1);
			self.content.reserve(target - self.content.len());
		}
		Ok(())
	}

	/// Append bytes to the buffer.
	pub fn append(&mut self, data: &[u8]) -> Result<(), BufError> {
		if data.len() == 0 {
			return Ok(());
		}
		self.reserve(data.len())?;
		// overwrite the terminator, then restore it after the new data
		let end = self.content.len() - 1;
		self.content.truncate(end);
		self.content.extend_from_slice(data);
		self.content.push(0u8);
		self.detached = false;
		Ok(())
	}

	/// Append bytes up to (but excluding) the first NUL byte in `data`, or
	/// all of `data` if it contains no NUL.
	pub fn append_cstr(&mut self, data: &[u8]) -> Result<(), BufError> {
		match data.iter().position(|&b| b == 0u8) {
			Some(pos) => self.append(&data[..pos]),
			None => self.append(data),
		}
	}

	/// Drop `amount` bytes from the front of the live data.
	///
	/// The dropped bytes remain in the backing storage until a later append
	/// reclaims them; consuming is O(1).
	///
	/// # Panics
	///
	/// Panics if `amount` exceeds [`ByteBuffer::len()`].
	pub fn consume(&mut self, amount: usize) {
		assert!(amount <= self.len());
		self.offset += amount;
	}

	/// Take ownership of the live data, leaving the buffer empty.
	///
	/// The data is returned as an ordinary [`Vec<u8>`]; the caller frees it
	/// through the global allocator like any other allocation. Detaching a
	/// static buffer fails with [`BufError::StaticBufferMutation`], and
	/// detaching again before new data has been appended fails with
	/// [`BufError::AlreadyDetached`].
	pub fn detach(&mut self) -> Result<Vec<u8>, BufError> {
		self.check_mutable()?;
		if self.detached {
			return Err(BufError::AlreadyDetached);
		}
		self.compact();
		let mut result = std::mem::replace(&mut self.content, vec![0u8]);
		// strip the terminator
		result.truncate(result.len() - 1);
		self.offset = 0;
		self.detached = true;
		Ok(result)
	}
}
