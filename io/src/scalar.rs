use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

/// Fixed-size numeric property types shared by PLY and PCD.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
}

impl ScalarType {
    /// PLY type names, including the sized aliases.
    pub fn from_ply_name(name: &str) -> Result<Self> {
        Ok(match name {
            "char" | "int8" => Self::I8,
            "uchar" | "uint8" => Self::U8,
            "short" | "int16" => Self::I16,
            "ushort" | "uint16" => Self::U16,
            "int" | "int32" => Self::I32,
            "uint" | "uint32" => Self::U32,
            "float" | "float32" => Self::F32,
            "double" | "float64" => Self::F64,
            other => {
                return Err(Error::Parse(format!("unknown PLY scalar type '{}'", other)));
            }
        })
    }

    /// PCD `TYPE`/`SIZE` pair.
    pub fn from_pcd(kind: char, size: usize) -> Result<Self> {
        Ok(match (kind, size) {
            ('I', 1) => Self::I8,
            ('U', 1) => Self::U8,
            ('I', 2) => Self::I16,
            ('U', 2) => Self::U16,
            ('I', 4) => Self::I32,
            ('U', 4) => Self::U32,
            ('F', 4) => Self::F32,
            ('F', 8) => Self::F64,
            _ => {
                return Err(Error::Parse(format!(
                    "unsupported PCD field type {}{}",
                    kind, size
                )));
            }
        })
    }

    pub fn size(self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::F64 => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    /// Full-scale value used to map integer colors into `[0, 1]`.
    pub fn color_scale(self) -> f64 {
        match self {
            Self::U8 | Self::I8 => 255.0,
            Self::U16 | Self::I16 => 65535.0,
            Self::U32 | Self::I32 => u32::MAX as f64,
            Self::F32 | Self::F64 => 1.0,
        }
    }

    /// Decode one value from the front of `bytes`.
    pub fn decode(self, bytes: &[u8], order: ByteOrder) -> Result<f64> {
        let size = self.size();
        if bytes.len() < size {
            return Err(Error::InvalidData("truncated binary record".to_string()));
        }

        macro_rules! read {
            ($t:ty, $n:expr) => {{
                let mut buf = [0u8; $n];
                buf.copy_from_slice(&bytes[..$n]);
                match order {
                    ByteOrder::Little => <$t>::from_le_bytes(buf) as f64,
                    ByteOrder::Big => <$t>::from_be_bytes(buf) as f64,
                }
            }};
        }

        Ok(match self {
            Self::I8 => bytes[0] as i8 as f64,
            Self::U8 => bytes[0] as f64,
            Self::I16 => read!(i16, 2),
            Self::U16 => read!(u16, 2),
            Self::I32 => read!(i32, 4),
            Self::U32 => read!(u32, 4),
            Self::F32 => read!(f32, 4),
            Self::F64 => read!(f64, 8),
        })
    }

    /// Parse one value from its text form.
    pub fn parse(self, token: &str) -> Result<f64> {
        let value = if self.is_float() {
            token.parse::<f64>().ok()
        } else {
            token
                .parse::<i64>()
                .ok()
                .map(|v| v as f64)
                .or_else(|| token.parse::<f64>().ok())
        };
        value.ok_or_else(|| Error::Parse(format!("invalid number: {}", token)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_endianness() {
        let le = 1.5f32.to_le_bytes();
        let be = 1.5f32.to_be_bytes();
        assert_eq!(ScalarType::F32.decode(&le, ByteOrder::Little).unwrap(), 1.5);
        assert_eq!(ScalarType::F32.decode(&be, ByteOrder::Big).unwrap(), 1.5);
        assert_eq!(ScalarType::I8.decode(&[0xff], ByteOrder::Little).unwrap(), -1.0);
        assert!(ScalarType::F64.decode(&[0u8; 4], ByteOrder::Little).is_err());
    }

    #[test]
    fn test_type_names() {
        assert_eq!(ScalarType::from_ply_name("float32").unwrap(), ScalarType::F32);
        assert_eq!(ScalarType::from_ply_name("uchar").unwrap(), ScalarType::U8);
        assert!(ScalarType::from_ply_name("quad").is_err());
        assert_eq!(ScalarType::from_pcd('F', 8).unwrap(), ScalarType::F64);
        assert!(ScalarType::from_pcd('F', 2).is_err());
    }
}
