//! 字节码读取游标
//!
//! 所有读取越界时返回 `UnexpectedEof`，不会 panic。

use crate::core::DeserialiseError;

pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 从当前位置到末尾的剩余字节
    pub fn rest(&self) -> &'a [u8] {
        &self.data[self.pos.min(self.data.len())..]
    }

    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8], DeserialiseError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or(DeserialiseError::UnexpectedEof(self.pos))?;
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    pub fn skip(&mut self, n: usize) -> Result<(), DeserialiseError> {
        self.bytes(n).map(|_| ())
    }

    pub fn u8(&mut self) -> Result<u8, DeserialiseError> {
        Ok(self.bytes(1)?[0])
    }

    pub fn bool(&mut self) -> Result<bool, DeserialiseError> {
        Ok(self.u8()? != 0)
    }

    pub fn u32(&mut self) -> Result<u32, DeserialiseError> {
        let b = self.bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn f32(&mut self) -> Result<f32, DeserialiseError> {
        Ok(f32::from_bits(self.u32()?))
    }

    pub fn f64(&mut self) -> Result<f64, DeserialiseError> {
        let b = self.bytes(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(f64::from_le_bytes(raw))
    }

    /// 7 位一组的无符号变长整数
    pub fn varint(&mut self) -> Result<u32, DeserialiseError> {
        let mut result = 0u32;
        for shift in (0..35).step_by(7) {
            let b = self.u8()?;
            result |= ((b & 0x7f) as u32).wrapping_shl(shift);
            if b & 0x80 == 0 {
                break;
            }
        }
        Ok(result)
    }

    pub fn varint_usize(&mut self) -> Result<usize, DeserialiseError> {
        Ok(self.varint()? as usize)
    }

    pub fn skip_varint(&mut self) -> Result<(), DeserialiseError> {
        self.varint().map(|_| ())
    }
}
