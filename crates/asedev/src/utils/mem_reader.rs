//! A bounds-checked little-endian cursor over an in-memory byte buffer.
//!
//! Every multi-byte read is little-endian, matching the container format.
//! Reads past the end of the window fail with [`MemReaderError`] instead of
//! panicking, so a truncated file surfaces as a structured error.

#[derive(Debug, thiserror::Error)]
pub enum MemReaderError {
    #[error("not enough data in buffer: needed {required}, but only {available} available")]
    NotEnoughData { required: usize, available: usize },
}

pub type Result<T> = std::result::Result<T, MemReaderError>;

macro_rules! impl_read_int {
    ($name:ident, $ty:ty) => {
        pub fn $name(&mut self) -> Result<$ty> {
            let mut buf = [0u8; std::mem::size_of::<$ty>()];
            self.read_exact(&mut buf)?;
            Ok(<$ty>::from_le_bytes(buf))
        }
    };
}

/// Sequential reader over a byte window.
///
/// Sub-readers created with [`MemReader::read_to_subreader`] borrow an exact
/// slice of the parent and advance the parent past it, which is how chunk
/// payloads are handed to their handlers.
#[derive(Debug, Clone)]
pub struct MemReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> MemReader<'a> {
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    #[must_use]
    pub fn tell(&self) -> usize {
        self.position
    }

    #[must_use]
    pub fn data_size(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn check_read_length(&self, len: usize) -> Result<()> {
        if self.remaining() < len {
            return Err(MemReaderError::NotEnoughData {
                required: len,
                available: self.remaining(),
            });
        }
        Ok(())
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.check_read_length(buf.len())?;
        buf.copy_from_slice(&self.data[self.position..self.position + buf.len()]);
        self.position += buf.len();
        Ok(())
    }

    /// Advances past `len` bytes without interpreting them.
    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.check_read_length(len)?;
        self.position += len;
        Ok(())
    }

    /// Takes the next `len` bytes as a borrowed slice.
    pub fn read_slice(&mut self, len: usize) -> Result<&'a [u8]> {
        self.check_read_length(len)?;
        let slice = &self.data[self.position..self.position + len];
        self.position += len;
        Ok(slice)
    }

    /// Takes the remaining bytes of the window as a borrowed slice.
    pub fn read_remaining(&mut self) -> &'a [u8] {
        let slice = &self.data[self.position..];
        self.position = self.data.len();
        slice
    }

    /// Splits off a child reader over exactly the next `len` bytes.
    pub fn read_to_subreader(&mut self, len: usize) -> Result<MemReader<'a>> {
        Ok(MemReader::new(self.read_slice(len)?))
    }

    impl_read_int!(read_u8, u8);
    impl_read_int!(read_i8, i8);
    impl_read_int!(read_u16_le, u16);
    impl_read_int!(read_i16_le, i16);
    impl_read_int!(read_u32_le, u32);
    impl_read_int!(read_i32_le, i32);

    /// Reads a 16.16 signed fixed-point value.
    pub fn read_fixed_le(&mut self) -> Result<f32> {
        let raw = self.read_i32_le()?;
        #[expect(clippy::cast_precision_loss)]
        Ok(raw as f32 / 65536.0)
    }

    /// Reads a u16-length-prefixed UTF-8 string.
    ///
    /// Invalid UTF-8 is replaced rather than rejected; names are display
    /// data, not structural data.
    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_u16_le()?;
        let bytes = self.read_slice(usize::from(len))?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datalit::datalit;

    #[test]
    fn reads_little_endian_integers() {
        let data = datalit!(@endian = le, 0x12u8, 0x3456u16, 0x789A_BCDEu32, 0xFFFEu16);
        let mut reader = MemReader::new(&data);
        assert_eq!(reader.read_u8().unwrap(), 0x12);
        assert_eq!(reader.read_u16_le().unwrap(), 0x3456);
        assert_eq!(reader.read_u32_le().unwrap(), 0x789A_BCDE);
        assert_eq!(reader.read_i16_le().unwrap(), -2);
        assert!(reader.is_empty());
    }

    #[test]
    fn read_past_end_reports_sizes() {
        let mut reader = MemReader::new(&[1, 2, 3]);
        reader.read_u16_le().unwrap();
        let err = reader.read_u32_le().unwrap_err();
        let MemReaderError::NotEnoughData {
            required,
            available,
        } = err;
        assert_eq!(required, 4);
        assert_eq!(available, 1);
    }

    #[test]
    fn subreader_is_windowed_and_advances_parent() {
        let mut reader = MemReader::new(&[1, 2, 3, 4, 5]);
        let mut sub = reader.read_to_subreader(3).unwrap();
        assert_eq!(sub.read_u8().unwrap(), 1);
        assert_eq!(sub.remaining(), 2);
        assert!(sub.read_u32_le().is_err());
        assert_eq!(reader.read_u8().unwrap(), 4);
    }

    #[test]
    fn reads_fixed_point() {
        let bytes = (-0x8000i32).to_le_bytes();
        let mut reader = MemReader::new(&bytes);
        let value = reader.read_fixed_le().unwrap();
        assert!((value + 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn reads_length_prefixed_string() {
        let data = datalit!(@endian = le, 5u16, b"hello", 0xFF);
        let mut reader = MemReader::new(&data);
        assert_eq!(reader.read_string().unwrap(), "hello");
        assert_eq!(reader.remaining(), 1);
    }
}
