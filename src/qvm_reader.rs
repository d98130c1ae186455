use anyhow::Result;

use std::io::Read;

/// Little-endian integer reads for the QVM container, every field in the
/// format is fixed width.
pub trait QvmRead: Read + Sized {
    fn read_u8(&mut self) -> Result<u8> {
        Ok(bincode::deserialize_from(self)?)
    }

    fn read_u32(&mut self) -> Result<u32> {
        Ok(bincode::deserialize_from(self)?)
    }

    fn read_i32(&mut self) -> Result<i32> {
        Ok(bincode::deserialize_from(self)?)
    }
}

impl<R: Read> QvmRead for R {}
