use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error, PartialEq)]
#[error("unrecognised dtype '{0}' (expected float32, float16 or bfloat16)")]
pub struct DTypeParseError(pub String);

/// Floating point element types a model can be stored or trained in.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    #[display("float32")]
    Float32,
    #[display("float16")]
    Float16,
    #[display("bfloat16")]
    BFloat16,
}

impl DType {
    #[inline]
    pub const fn bytes(self) -> u64 {
        match self {
            DType::Float32 => 4,
            DType::Float16 | DType::BFloat16 => 2,
        }
    }

    #[inline]
    pub fn bits(self) -> f64 {
        (self.bytes() * 8) as f64
    }

    /// Half precision training keeps a single precision master copy of
    /// trainable weights.
    #[inline]
    pub const fn is_half(self) -> bool {
        matches!(self, DType::Float16 | DType::BFloat16)
    }
}

impl std::str::FromStr for DType {
    type Err = DTypeParseError;

    /// Accepts the `torch_dtype` spellings used in hub config documents.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "float32" | "fp32" | "f32" | "torch.float32" | "float" => Ok(DType::Float32),
            "float16" | "fp16" | "f16" | "torch.float16" | "half" => Ok(DType::Float16),
            "bfloat16" | "bf16" | "torch.bfloat16" => Ok(DType::BFloat16),
            _ => Err(DTypeParseError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths() {
        assert_eq!(DType::Float32.bytes(), 4);
        assert_eq!(DType::BFloat16.bytes(), 2);
        assert_eq!(DType::Float16.bits(), 16.0);
        assert!(DType::BFloat16.is_half());
        assert!(!DType::Float32.is_half());
    }

    #[test]
    fn parses_torch_spellings() {
        assert_eq!("bfloat16".parse::<DType>().unwrap(), DType::BFloat16);
        assert_eq!("torch.float16".parse::<DType>().unwrap(), DType::Float16);
        assert_eq!("FP32".parse::<DType>().unwrap(), DType::Float32);
        assert!("int4".parse::<DType>().is_err());
    }
}
