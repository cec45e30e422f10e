//! LSB-first bit I/O shared by the entropy primitives.

/// Packs bits LSB-first into a caller-owned byte buffer.
pub(crate) struct BitWriter<'a> {
    out: &'a mut Vec<u8>,
    container: u64,
    bit_pos: u32,
}

impl<'a> BitWriter<'a> {
    pub(crate) fn new(out: &'a mut Vec<u8>) -> Self {
        BitWriter {
            out,
            container: 0,
            bit_pos: 0,
        }
    }

    #[inline]
    pub(crate) fn write_bits(&mut self, value: u32, nb_bits: u32) {
        debug_assert!(nb_bits <= 32);
        if nb_bits == 0 {
            return;
        }
        let mask = (1u64 << nb_bits) - 1;
        self.container |= (value as u64 & mask) << self.bit_pos;
        self.bit_pos += nb_bits;
        while self.bit_pos >= 8 {
            self.out.push(self.container as u8);
            self.container >>= 8;
            self.bit_pos -= 8;
        }
    }

    /// Flush the partial trailing byte.
    pub(crate) fn finish(self) {
        if self.bit_pos > 0 {
            self.out.push(self.container as u8);
        }
    }
}

/// Reads bits LSB-first. Reads past the end yield zero bits; callers check
/// [`BitReader::overrun`] once decoding is done.
pub(crate) struct BitReader<'a> {
    data: &'a [u8],
    byte_pos: usize,
    container: u64,
    bits_available: u32,
    consumed: u64,
}

impl<'a> BitReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        let mut reader = BitReader {
            data,
            byte_pos: 0,
            container: 0,
            bits_available: 0,
            consumed: 0,
        };
        reader.refill();
        reader
    }

    #[inline]
    fn refill(&mut self) {
        while self.bits_available <= 56 && self.byte_pos < self.data.len() {
            self.container |= (self.data[self.byte_pos] as u64) << self.bits_available;
            self.byte_pos += 1;
            self.bits_available += 8;
        }
    }

    /// Look at the next `nb_bits` bits without consuming them.
    #[inline]
    pub(crate) fn peek_bits(&mut self, nb_bits: u32) -> u32 {
        debug_assert!(nb_bits <= 32);
        if nb_bits == 0 {
            return 0;
        }
        self.refill();
        (self.container & ((1u64 << nb_bits) - 1)) as u32
    }

    #[inline]
    pub(crate) fn consume(&mut self, nb_bits: u32) {
        self.container >>= nb_bits;
        self.bits_available = self.bits_available.saturating_sub(nb_bits);
        self.consumed += nb_bits as u64;
    }

    #[inline]
    pub(crate) fn read_bits(&mut self, nb_bits: u32) -> u32 {
        let value = self.peek_bits(nb_bits);
        self.consume(nb_bits);
        value
    }

    /// True if more bits were consumed than the input holds.
    pub(crate) fn overrun(&self) -> bool {
        self.consumed > self.data.len() as u64 * 8
    }
}
