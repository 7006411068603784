use crate::core::errors::{LockstepError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Element datatype of an array. Stored little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    U8,
    I32,
    I64,
    U64,
    F32,
    F64,
}

impl DType {
    pub fn item_size(&self) -> usize {
        match self {
            DType::U8 => 1,
            DType::I32 | DType::F32 => 4,
            DType::I64 | DType::U64 | DType::F64 => 8,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DType::U8 => "u8",
            DType::I32 => "i32",
            DType::I64 => "i64",
            DType::U64 => "u64",
            DType::F32 => "f32",
            DType::F64 => "f64",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed flat buffer holding the items of one record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArrayData {
    U8(Vec<u8>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    U64(Vec<u64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

macro_rules! for_each_variant {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            ArrayData::U8($v) => $body,
            ArrayData::I32($v) => $body,
            ArrayData::I64($v) => $body,
            ArrayData::U64($v) => $body,
            ArrayData::F32($v) => $body,
            ArrayData::F64($v) => $body,
        }
    };
}

macro_rules! decode_le {
    ($bytes:expr, $ty:ty) => {
        $bytes
            .chunks_exact(std::mem::size_of::<$ty>())
            .map(|c| {
                let mut buf = [0u8; std::mem::size_of::<$ty>()];
                buf.copy_from_slice(c);
                <$ty>::from_le_bytes(buf)
            })
            .collect()
    };
}

impl ArrayData {
    pub fn dtype(&self) -> DType {
        match self {
            ArrayData::U8(_) => DType::U8,
            ArrayData::I32(_) => DType::I32,
            ArrayData::I64(_) => DType::I64,
            ArrayData::U64(_) => DType::U64,
            ArrayData::F32(_) => DType::F32,
            ArrayData::F64(_) => DType::F64,
        }
    }

    pub fn len(&self) -> usize {
        for_each_variant!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Zero-filled buffer, the value of slots nobody wrote
    pub fn zeros(dtype: DType, len: usize) -> Self {
        match dtype {
            DType::U8 => ArrayData::U8(vec![0; len]),
            DType::I32 => ArrayData::I32(vec![0; len]),
            DType::I64 => ArrayData::I64(vec![0; len]),
            DType::U64 => ArrayData::U64(vec![0; len]),
            DType::F32 => ArrayData::F32(vec![0.0; len]),
            DType::F64 => ArrayData::F64(vec![0.0; len]),
        }
    }

    pub fn to_le_bytes(&self) -> Vec<u8> {
        for_each_variant!(self, v => v.iter().flat_map(|x| x.to_le_bytes()).collect())
    }

    pub fn from_le_bytes(dtype: DType, bytes: &[u8]) -> Result<Self> {
        if bytes.len() % dtype.item_size() != 0 {
            return Err(LockstepError::internal(format!(
                "{} bytes is not a whole number of {} items",
                bytes.len(),
                dtype
            )));
        }
        Ok(match dtype {
            DType::U8 => ArrayData::U8(bytes.to_vec()),
            DType::I32 => ArrayData::I32(decode_le!(bytes, i32)),
            DType::I64 => ArrayData::I64(decode_le!(bytes, i64)),
            DType::U64 => ArrayData::U64(decode_le!(bytes, u64)),
            DType::F32 => ArrayData::F32(decode_le!(bytes, f32)),
            DType::F64 => ArrayData::F64(decode_le!(bytes, f64)),
        })
    }
}

impl From<Vec<u8>> for ArrayData {
    fn from(v: Vec<u8>) -> Self {
        ArrayData::U8(v)
    }
}

impl From<Vec<i32>> for ArrayData {
    fn from(v: Vec<i32>) -> Self {
        ArrayData::I32(v)
    }
}

impl From<Vec<i64>> for ArrayData {
    fn from(v: Vec<i64>) -> Self {
        ArrayData::I64(v)
    }
}

impl From<Vec<u64>> for ArrayData {
    fn from(v: Vec<u64>) -> Self {
        ArrayData::U64(v)
    }
}

impl From<Vec<f32>> for ArrayData {
    fn from(v: Vec<f32>) -> Self {
        ArrayData::F32(v)
    }
}

impl From<Vec<f64>> for ArrayData {
    fn from(v: Vec<f64>) -> Self {
        ArrayData::F64(v)
    }
}

/// The payload of one entry for one array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    shape: Vec<usize>,
    data: ArrayData,
}

impl Record {
    pub fn new<D: Into<ArrayData>>(shape: Vec<usize>, data: D) -> Result<Self> {
        let data = data.into();
        let expected: usize = shape.iter().product();
        if data.len() != expected {
            return Err(LockstepError::invalid_shape(format!(
                "record of shape {:?} needs {} items, got {}",
                shape,
                expected,
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    /// Single-item record for arrays with no inner dimensions
    pub fn scalar<D: Into<ArrayData>>(data: D) -> Result<Self> {
        Self::new(Vec::new(), data)
    }

    pub fn zeros(dtype: DType, shape: Vec<usize>) -> Self {
        let len = shape.iter().product();
        Self {
            shape,
            data: ArrayData::zeros(dtype, len),
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &ArrayData {
        &self.data
    }

    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    pub fn byte_len(&self) -> usize {
        self.data.len() * self.dtype().item_size()
    }

    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.data.to_le_bytes()
    }

    pub fn from_le_bytes(dtype: DType, shape: Vec<usize>, bytes: &[u8]) -> Result<Self> {
        Self::new(shape, ArrayData::from_le_bytes(dtype, bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_len_checked() {
        assert!(Record::new(vec![2, 3], vec![0.0f32; 6]).is_ok());
        let err = Record::new(vec![2, 3], vec![0.0f32; 5]).unwrap_err();
        assert!(matches!(err, LockstepError::InvalidShape { .. }));
    }

    #[test]
    fn test_scalar_record() {
        let rec = Record::scalar(vec![9.5f64]).unwrap();
        assert!(rec.shape().is_empty());
        assert_eq!(rec.dtype(), DType::F64);
        assert_eq!(rec.byte_len(), 8);
    }

    #[test]
    fn test_le_bytes_preserve_values() {
        let rec = Record::new(vec![3], vec![-1i64, 0, i64::MAX]).unwrap();
        let bytes = rec.to_le_bytes();
        assert_eq!(bytes.len(), 24);
        let back = Record::from_le_bytes(DType::I64, vec![3], &bytes).unwrap();
        assert_eq!(back, rec);
    }

    #[test]
    fn test_ragged_bytes_rejected() {
        assert!(ArrayData::from_le_bytes(DType::F32, &[0u8; 6]).is_err());
    }
}
