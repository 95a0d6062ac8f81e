// src/ops.rs
//
// Operation descriptors.
// Parsing validates the name and the per-operation parameters up front, so the
// dispatcher only ever sees well-formed operations.

use crate::error::{ImageLabError, Result};
use serde_json::Value;
use std::fmt;

/// Fixed WebP quality used by the `webp` operation unless configured otherwise.
pub const DEFAULT_WEBP_QUALITY: u8 = 90;

/// A reduce ratio in (0, 1].
///
/// The value is kept exactly as given; equality, hashing and the file token
/// all go through its bit pattern or its shortest round-trip decimal form, so
/// two scales share a name only when they are the same number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Scale {
    bits: u64,
}

impl Scale {
    pub fn new(value: f64) -> Result<Self> {
        if !value.is_finite() || value <= 0.0 || value > 1.0 {
            return Err(ImageLabError::invalid_parameter(
                "scale",
                value.to_string(),
                "must be greater than 0 and at most 1",
            ));
        }
        Ok(Self {
            bits: value.to_bits(),
        })
    }

    pub fn value(self) -> f64 {
        f64::from_bits(self.bits)
    }

    /// File-name friendly form: `0.5` -> `0p5`, `0.12345` -> `0p12345`, `1` -> `1`.
    pub fn token(self) -> String {
        self.value().to_string().replace('.', "p")
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

/// The closed set of operations a client can request for an uploaded image.
///
/// Each variant owns its parameters; there is no untyped parameter bag past
/// `Operation::parse`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Downscale both dimensions by `scale`
    Reduce { scale: Scale },

    /// Re-encode as WebP and report the size change
    Webp,

    /// Top/bottom flip
    Mirror,

    /// Single-channel luminance conversion
    Gray,

    /// Channel histograms, statistics and structure
    Analyse,
}

impl Operation {
    pub const NAMES: [&'static str; 5] = ["reduce", "webp", "mirror", "gray", "analyse"];

    /// Parse an operation name plus its JSON parameters.
    ///
    /// `params` may be `null` or an object. Operations without parameters
    /// ignore whatever keys are present.
    pub fn parse(name: &str, params: &Value) -> Result<Self> {
        match name {
            "reduce" => {
                let scale = scale_param(params)?;
                Ok(Self::Reduce {
                    scale: Scale::new(scale)?,
                })
            }
            "webp" => Ok(Self::Webp),
            "mirror" => Ok(Self::Mirror),
            "gray" => Ok(Self::Gray),
            "analyse" => Ok(Self::Analyse),
            other => Err(ImageLabError::unsupported_operation(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Reduce { .. } => "reduce",
            Self::Webp => "webp",
            Self::Mirror => "mirror",
            Self::Gray => "gray",
            Self::Analyse => "analyse",
        }
    }

    /// Name of the derived image this operation writes for `source_key`.
    /// `Analyse` produces charts instead, named by `chart_artifact_name`.
    pub fn artifact_name(&self, source_key: &str) -> Option<String> {
        match self {
            Self::Reduce { scale } => Some(format!("{source_key}_reduced_{}.png", scale.token())),
            Self::Webp => Some(format!("{source_key}_webp.webp")),
            Self::Mirror => Some(format!("{source_key}_mirrored.png")),
            Self::Gray => Some(format!("{source_key}_gray.png")),
            Self::Analyse => None,
        }
    }
}

fn scale_param(params: &Value) -> Result<f64> {
    let raw = match params {
        Value::Object(map) => map.get("scale"),
        Value::Null => None,
        other => {
            return Err(ImageLabError::invalid_parameter(
                "params",
                other.to_string(),
                "expected an object",
            ))
        }
    };
    match raw {
        Some(Value::Number(n)) => n.as_f64().ok_or_else(|| {
            ImageLabError::invalid_parameter("scale", n.to_string(), "not representable as f64")
        }),
        Some(Value::String(s)) => s.trim().parse::<f64>().map_err(|_| {
            ImageLabError::invalid_parameter("scale", s.clone(), "expected a number")
        }),
        Some(other) => Err(ImageLabError::invalid_parameter(
            "scale",
            other.to_string(),
            "expected a number",
        )),
        None => Err(ImageLabError::invalid_parameter(
            "scale",
            "<missing>",
            "reduce requires a scale in (0, 1]",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_parse_known_operations() {
        assert_eq!(Operation::parse("webp", &Value::Null).unwrap(), Operation::Webp);
        assert_eq!(Operation::parse("mirror", &json!({})).unwrap(), Operation::Mirror);
        assert_eq!(
            Operation::parse("gray", &json!({"scale": 3})).unwrap(),
            Operation::Gray
        );
        assert_eq!(
            Operation::parse("analyse", &Value::Null).unwrap(),
            Operation::Analyse
        );
        let reduce = Operation::parse("reduce", &json!({"scale": 0.5})).unwrap();
        assert_eq!(reduce.name(), "reduce");
    }

    #[test]
    fn test_parse_unknown_operation() {
        let err = Operation::parse("rotate", &Value::Null).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
    }

    #[test]
    fn test_reduce_scale_validation() {
        for bad in [json!({"scale": 0}), json!({"scale": -0.5}), json!({"scale": 1.5})] {
            let err = Operation::parse("reduce", &bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidParameter, "{bad}");
        }
        let err = Operation::parse("reduce", &json!({})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
        let err = Operation::parse("reduce", &json!({"scale": "half"})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
        let err = Operation::parse("reduce", &json!([0.5])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    }

    #[test]
    fn test_reduce_scale_accepts_numeric_string() {
        let op = Operation::parse("reduce", &json!({"scale": " 0.25 "})).unwrap();
        assert_eq!(
            op,
            Operation::Reduce {
                scale: Scale::new(0.25).unwrap()
            }
        );
    }

    #[test]
    fn test_scale_keeps_exact_value_and_token() {
        assert_eq!(Scale::new(0.5).unwrap().token(), "0p5");
        assert_eq!(Scale::new(0.125).unwrap().token(), "0p125");
        assert_eq!(Scale::new(0.05).unwrap().token(), "0p05");
        assert_eq!(Scale::new(1.0).unwrap().token(), "1");
        assert_eq!(Scale::new(0.12345).unwrap().token(), "0p12345");
        assert_eq!(Scale::new(0.00004).unwrap().token(), "0p00004");
        assert_eq!(Scale::new(0.12345).unwrap().value(), 0.12345);
        assert_ne!(Scale::new(0.50001).unwrap(), Scale::new(0.5).unwrap());
        assert_ne!(
            Scale::new(0.50001).unwrap().token(),
            Scale::new(0.5).unwrap().token()
        );
        assert!(Scale::new(f64::NAN).is_err());
        assert!(Scale::new(-0.0).is_err());
    }

    #[test]
    fn test_tiny_scales_parse() {
        let op = Operation::parse("reduce", &json!({"scale": 0.00004})).unwrap();
        assert_eq!(
            op,
            Operation::Reduce {
                scale: Scale::new(0.00004).unwrap()
            }
        );
        let op = Operation::parse("reduce", &json!({"scale": "0.00001"})).unwrap();
        assert_eq!(op.artifact_name("k").unwrap(), "k_reduced_0p00001.png");
    }

    #[test]
    fn test_artifact_names_are_distinct_per_operation() {
        let key = "photo_png";
        let names: Vec<String> = [
            Operation::Reduce {
                scale: Scale::new(0.5).unwrap(),
            },
            Operation::Reduce {
                scale: Scale::new(0.25).unwrap(),
            },
            Operation::Webp,
            Operation::Mirror,
            Operation::Gray,
        ]
        .iter()
        .filter_map(|op| op.artifact_name(key))
        .collect();
        assert_eq!(
            names,
            vec![
                "photo_png_reduced_0p5.png",
                "photo_png_reduced_0p25.png",
                "photo_png_webp.webp",
                "photo_png_mirrored.png",
                "photo_png_gray.png",
            ]
        );
        assert!(Operation::Analyse.artifact_name(key).is_none());
    }
}
