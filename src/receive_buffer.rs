/// Bytes collected during the read phase.
///
/// `expected` is the read cursor: how many bytes the transaction asked for.
/// The interrupt appends, the foreground copies out once the bus is idle.
pub struct ReceiveBuffer<const BUFSIZE: usize> {
    buf: [u8; BUFSIZE],
    size: usize,
    expected: usize,
}

impl<const BUFSIZE: usize> ReceiveBuffer<BUFSIZE> {
    pub const fn new() -> Self {
        Self {
            buf: [0; BUFSIZE],
            size: 0,
            expected: 0,
        }
    }

    /// Drops any content and arms the buffer for `len` bytes.
    pub fn expect(&mut self, len: usize) -> Result<(), usize> {
        if len > BUFSIZE {
            return Err(BUFSIZE);
        }

        self.size = 0;
        self.expected = len;
        Ok(())
    }

    pub fn write_byte(&mut self, byte: u8) -> Result<(), ()> {
        if self.size == self.expected {
            Err(())
        } else {
            self.buf[self.size] = byte;
            self.size += 1;
            Ok(())
        }
    }

    pub fn remaining(&self) -> usize {
        self.expected - self.size
    }

    pub fn read(&self, buf: &mut [u8]) -> Result<usize, usize> {
        if buf.len() < self.size {
            Err(self.size)
        } else {
            buf[..self.size].copy_from_slice(&self.buf[..self.size]);
            Ok(self.size)
        }
    }

    /// Discards received bytes but keeps the expected count.
    pub fn reset(&mut self) {
        self.size = 0;
    }

    pub fn clear(&mut self) {
        self.size = 0;
        self.expected = 0;
    }
}
