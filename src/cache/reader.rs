use crate::cache::error::{DecodeError, DecodeResult};


/// Sequential big-endian reader over a byte slice.
///
/// The offset may be moved anywhere, reads past the end fail with
/// [`DecodeError::OutOfBounds`] and leave the offset untouched.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    offset: usize,
}


impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    pub fn at(data: &'a [u8], offset: usize) -> Self {
        Self { data, offset }
    }

    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    #[inline]
    pub fn set_offset(&mut self, offset: usize) {
        self.offset = offset;
    }

    /// positions the cursor `n` bytes before the end of the buffer
    pub fn seek_from_end(&mut self, n: usize) -> DecodeResult<()> {
        if n > self.data.len() {
            return Err(DecodeError::OutOfBounds { offset: 0, wanted: n, len: self.data.len() });
        }
        self.offset = self.data.len() - n;
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.offset)
    }

    #[inline]
    fn take<const N: usize>(&mut self) -> DecodeResult<[u8; N]> {
        let end = self.offset.checked_add(N).filter(|&end| end <= self.data.len());
        match end {
            Some(end) => {
                let mut buff = [0; N];
                buff.copy_from_slice(&self.data[self.offset..end]);
                self.offset = end;
                Ok(buff)
            }
            None => Err(DecodeError::OutOfBounds { offset: self.offset, wanted: N, len: self.data.len() }),
        }
    }

    pub fn skip(&mut self, n: usize) -> DecodeResult<()> {
        if n > self.remaining() {
            return Err(DecodeError::OutOfBounds { offset: self.offset, wanted: n, len: self.data.len() });
        }
        self.offset += n;
        Ok(())
    }

    pub fn read_bytes(&mut self, n: usize) -> DecodeResult<&'a [u8]> {
        if n > self.remaining() {
            return Err(DecodeError::OutOfBounds { offset: self.offset, wanted: n, len: self.data.len() });
        }
        let slice = &self.data[self.offset..self.offset + n];
        self.offset += n;
        Ok(slice)
    }

    #[inline]
    pub fn read_u8(&mut self) -> DecodeResult<u8> {
        Ok(u8::from_be_bytes(self.take()?))
    }

    #[inline]
    pub fn read_i8(&mut self) -> DecodeResult<i8> {
        Ok(i8::from_be_bytes(self.take()?))
    }

    #[inline]
    pub fn read_bool(&mut self) -> DecodeResult<bool> {
        Ok(self.read_u8()? == 1)
    }

    #[inline]
    pub fn read_u16(&mut self) -> DecodeResult<u16> {
        Ok(u16::from_be_bytes(self.take()?))
    }

    #[inline]
    pub fn read_i16(&mut self) -> DecodeResult<i16> {
        Ok(i16::from_be_bytes(self.take()?))
    }

    /// three byte unsigned value
    #[inline]
    pub fn read_u24(&mut self) -> DecodeResult<u32> {
        let [a, b, c] = self.take::<3>()?;
        Ok(((a as u32) << 16) | ((b as u32) << 8) | c as u32)
    }

    #[inline]
    pub fn read_u32(&mut self) -> DecodeResult<u32> {
        Ok(u32::from_be_bytes(self.take()?))
    }

    #[inline]
    pub fn read_i32(&mut self) -> DecodeResult<i32> {
        Ok(i32::from_be_bytes(self.take()?))
    }

    #[inline]
    fn peek_u8(&self) -> DecodeResult<u8> {
        self.data.get(self.offset).copied()
            .ok_or(DecodeError::OutOfBounds { offset: self.offset, wanted: 1, len: self.data.len() })
    }

    /// Signed smart: one byte for -64..64, two bytes for -16384..16384.
    pub fn read_smart(&mut self) -> DecodeResult<i32> {
        if self.peek_u8()? < 128 {
            Ok(self.read_u8()? as i32 - 64)
        } else {
            Ok(self.read_u16()? as i32 - 49152)
        }
    }

    /// Unsigned smart: one byte for 0..128, two bytes for 0..32768.
    pub fn read_usmart(&mut self) -> DecodeResult<u32> {
        if self.peek_u8()? < 128 {
            Ok(self.read_u8()? as u32)
        } else {
            Ok(self.read_u16()? as u32 - 32768)
        }
    }

    /// Big smart: two bytes when the top bit is clear (32767 means none), four bytes otherwise.
    pub fn read_big_smart(&mut self) -> DecodeResult<Option<u32>> {
        if self.peek_u8()? & 0x80 != 0 {
            Ok(Some(self.read_u32()? & 0x7FFF_FFFF))
        } else {
            let value = self.read_u16()?;
            Ok(if value == 32767 { None } else { Some(value as u32) })
        }
    }

    /// zero terminated single byte string
    pub fn read_string(&mut self) -> DecodeResult<String> {
        let mut result = String::new();
        loop {
            match self.read_u8()? {
                0 => break,
                b => result.push(b as char),
            }
        }
        Ok(result)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::writer::ByteWriter;
    use proptest::prelude::*;

    #[test]
    fn reads_big_endian_fields() {
        let data = [0x12, 0x34, 0x56, 0xFF, 0xFE, 0x80, 0, 0, 1];
        let mut cursor = ByteCursor::new(&data);
        assert_eq!(cursor.read_u24().unwrap(), 0x123456);
        assert_eq!(cursor.read_i16().unwrap(), -2);
        assert_eq!(cursor.read_u32().unwrap(), 0x8000_0001);
        assert_eq!(cursor.remaining(), 0);
    }

    #[test]
    fn out_of_bounds_keeps_offset() {
        let data = [1, 2, 3];
        let mut cursor = ByteCursor::at(&data, 2);
        match cursor.read_u16() {
            Err(DecodeError::OutOfBounds { offset: 2, wanted: 2, len: 3 }) => {}
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(cursor.offset(), 2);
        assert_eq!(cursor.read_u8().unwrap(), 3);
        assert!(cursor.read_smart().is_err());
    }

    #[test]
    fn trailer_lookup_from_end() {
        let data = [9, 9, 9, 0, 7];
        let mut cursor = ByteCursor::new(&data);
        cursor.seek_from_end(2).unwrap();
        assert_eq!(cursor.read_u16().unwrap(), 7);
        assert!(cursor.seek_from_end(6).is_err());
    }

    #[test]
    fn big_smart_widths() {
        let mut w = ByteWriter::new();
        w.put_u16(5).put_u16(32767).put_u32(0x8001_0000);
        let data = w.into_inner();
        let mut cursor = ByteCursor::new(&data);
        assert_eq!(cursor.read_big_smart().unwrap(), Some(5));
        assert_eq!(cursor.read_big_smart().unwrap(), None);
        assert_eq!(cursor.read_big_smart().unwrap(), Some(0x10000));
    }

    #[test]
    fn strings_stop_at_zero() {
        let mut w = ByteWriter::new();
        w.put_string("Oak tree").put_u8(4);
        let data = w.into_inner();
        let mut cursor = ByteCursor::new(&data);
        assert_eq!(cursor.read_string().unwrap(), "Oak tree");
        assert_eq!(cursor.read_u8().unwrap(), 4);
    }

    proptest! {
        #[test]
        fn signed_smart_round_trip(value in -16384i32..16384) {
            let mut w = ByteWriter::new();
            w.put_smart(value);
            let data = w.into_inner();
            prop_assert_eq!(data.len(), if (-64..64).contains(&value) { 1 } else { 2 });
            let mut cursor = ByteCursor::new(&data);
            prop_assert_eq!(cursor.read_smart().unwrap(), value);
        }

        #[test]
        fn unsigned_smart_round_trip(value in 0u32..32768) {
            let mut w = ByteWriter::new();
            w.put_usmart(value);
            let data = w.into_inner();
            let mut cursor = ByteCursor::new(&data);
            prop_assert_eq!(cursor.read_usmart().unwrap(), value);
            prop_assert_eq!(cursor.remaining(), 0);
        }

        #[test]
        fn tri_byte_round_trip(value in 0u32..0x100_0000) {
            let mut w = ByteWriter::new();
            w.put_u24(value);
            let data = w.into_inner();
            prop_assert_eq!(ByteCursor::new(&data).read_u24().unwrap(), value);
        }
    }
}
