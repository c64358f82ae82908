/// Bytes queued for the write phase. The interrupt pops them one at a time.
pub struct SendBuffer<const BUFSIZE: usize> {
    buf: [u8; BUFSIZE],
    pos: usize,
    end: usize,
}

impl<const BUFSIZE: usize> SendBuffer<BUFSIZE> {
    pub const fn new() -> Self {
        Self {
            buf: [0; BUFSIZE],
            pos: 0,
            end: 0,
        }
    }

    /// Copies `buf` in and resets the cursor. Fails with the capacity if `buf`
    /// does not fit; the previous content is kept in that case.
    pub fn load(&mut self, buf: &[u8]) -> Result<(), usize> {
        if buf.len() > BUFSIZE {
            return Err(BUFSIZE);
        }

        self.buf[..buf.len()].copy_from_slice(buf);
        self.pos = 0;
        self.end = buf.len();

        Ok(())
    }

    pub fn reset(&mut self) {
        self.pos = 0;
        self.end = 0;
    }

    /// Moves the cursor back to the first byte without dropping the content.
    pub fn rewind(&mut self) {
        self.pos = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.pos
    }
}

impl<const BUFSIZE: usize> Iterator for SendBuffer<BUFSIZE> {
    type Item = u8;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_empty() {
            None
        } else {
            self.pos += 1;
            Some(self.buf[self.pos - 1])
        }
    }
}
