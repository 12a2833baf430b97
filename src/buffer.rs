use bytes::BytesMut;

/// A packet buffer with a sliding head.
///
/// The buffer owns a single allocation of `total_size` bytes. `head` is an
/// offset into it and the valid content is `[head, total_size)`.
///
/// Headers are written outside-in: the innermost protocol allocates room for
/// every header below it and [`push`](PacketBuf::push)es past them, each
/// outer layer then [`pop`](PacketBuf::pop)s room for its own header and
/// writes it in place, so the payload is never copied.
#[derive(Debug)]
pub struct PacketBuf {
    head: usize,
    buf: BytesMut,
}

impl PacketBuf {
    pub fn allocate(size: usize) -> Self {
        Self {
            head: 0,
            buf: BytesMut::zeroed(size),
        }
    }
    /// Consume `size` bytes at the head.
    ///
    /// # Panics
    /// If `size` exceeds the current size.
    pub fn push(&mut self, size: usize) {
        if size > self.curr_size() {
            panic!("net: sbuff overflow");
        }
        self.head += size;
    }
    /// Give `size` bytes of headroom back to the content.
    ///
    /// # Panics
    /// If there are fewer than `size` bytes of headroom.
    pub fn pop(&mut self, size: usize) {
        if size + self.curr_size() > self.total_size() {
            panic!("net: sbuff underflow");
        }
        self.head -= size;
    }
    pub fn head(&self) -> usize {
        self.head
    }
    pub fn curr_size(&self) -> usize {
        self.buf.len() - self.head
    }
    pub fn total_size(&self) -> usize {
        self.buf.len()
    }
    pub fn bytes(&self) -> &[u8] {
        &self.buf[self.head..]
    }
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.head..]
    }
    pub fn as_full_slice(&self) -> &[u8] {
        &self.buf
    }
}

/// Bounded byte buffer with a fixed capacity, used to collect inbound
/// stream data before it is handed to the application.
#[derive(Debug)]
pub struct FixedBuffer {
    capacity: usize,
    buf: BytesMut,
}
impl FixedBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            buf: BytesMut::with_capacity(capacity),
        }
    }
    pub fn available(&self) -> usize {
        self.capacity - self.buf.len()
    }
    /// Appends all of `buf` or nothing.
    pub fn try_extend(&mut self, buf: &[u8]) -> bool {
        if buf.len() > self.available() {
            return false;
        }
        self.buf.extend_from_slice(buf);
        true
    }
    pub fn len(&self) -> usize {
        self.buf.len()
    }
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }
    /// Moves the buffered bytes out, leaving the buffer empty.
    pub fn take(&mut self) -> BytesMut {
        self.buf.split()
    }
}
