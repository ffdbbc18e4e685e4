//! Turns an operation tag plus a loosely typed [`ParameterBag`] into a
//! validated [`Operation`].
//!
//! Resolution only checks the *shape* of the parameters. Whether they make
//! sense for a particular image (a crop rectangle inside the bounds, say) is
//! decided when the operation is applied.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumIter, EnumString, IntoStaticStr, VariantNames};
use tracing::debug;

use crate::{
    error::{Result, RetouchError},
    operations::{Blur, BlurIntensity, Brightness, Contrast, Crop, Operation, RightAngle, Rotate},
    traits::ImageOperation,
    types::ParameterBag,
};

/// Every operation tag a caller may submit.
#[derive(
    Debug, Clone, Copy, Hash, Eq,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString, EnumIter, VariantNames, IntoStaticStr,
    PartialEq
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum OperationKind {
    Brightness,
    Contrast,
    Crop,
    Rotate,
    Blur,
    AiEnhance,
    BackgroundRemoval,
    StyleTransfer,
    Generate,
}

impl OperationKind {
    /// Get a list of all recognised tags
    pub fn tags() -> &'static [&'static str] {
        <Self as VariantNames>::VARIANTS
    }

    /// Whether a concrete operation backs this tag.
    pub fn is_supported(&self) -> bool {
        matches!(
            self,
            Self::Brightness | Self::Contrast | Self::Crop | Self::Rotate | Self::Blur
        )
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Brightness => "Raise or lower brightness; the sign picks the direction",
            Self::Contrast => "Scale contrast around mid-grey",
            Self::Crop => "Cut out a rectangle of the image",
            Self::Rotate => "Rotate clockwise by 90, 180 or 270 degrees",
            Self::Blur => "Gaussian blur at a light, medium or strong level",
            Self::AiEnhance => "AI upscaling and enhancement (not available)",
            Self::BackgroundRemoval => "AI background removal (not available)",
            Self::StyleTransfer => "AI style transfer (not available)",
            Self::Generate => "Generate a new image from a prompt (not available)",
        }
    }

    /// Parameter name, description and whether it is required.
    pub fn parameters_info(&self) -> Vec<(&'static str, &'static str, bool)> {
        match self {
            Self::Brightness => vec![
                ("brightness", "Signed integer offset (negative darkens)", true),
            ],
            Self::Contrast => vec![
                ("contrast", "Contrast factor (positive increases contrast)", true),
            ],
            Self::Crop => vec![
                ("x", "Left edge in pixels", true),
                ("y", "Top edge in pixels", true),
                ("width", "Width in pixels", true),
                ("height", "Height in pixels", true),
            ],
            Self::Rotate => vec![
                ("angle", "\"90\", \"180\", \"270\" or a number of degrees snapped to the nearest quarter turn", true),
            ],
            Self::Blur => vec![
                ("intensity", "\"light\", \"medium\", \"strong\" or an integer scale (0-3 light, 4-6 medium, 7+ strong)", true),
            ],
            Self::AiEnhance | Self::BackgroundRemoval | Self::StyleTransfer | Self::Generate => vec![],
        }
    }
}

/// Resolve `tag` and `params` into a concrete operation.
pub fn resolve(tag: &str, params: &ParameterBag) -> Result<Operation> {
    let kind: OperationKind = tag.trim().parse().map_err(|_| {
        RetouchError::validation(tag, None, format!("unknown operation tag '{tag}'"))
    })?;
    let params = Params { kind, bag: params };

    let operation = match kind {
        OperationKind::Brightness => resolve_brightness(&params)?,
        OperationKind::Contrast => resolve_contrast(&params)?,
        OperationKind::Crop => resolve_crop(&params)?,
        OperationKind::Rotate => resolve_rotate(&params)?,
        OperationKind::Blur => resolve_blur(&params)?,
        OperationKind::AiEnhance
        | OperationKind::BackgroundRemoval
        | OperationKind::StyleTransfer
        | OperationKind::Generate => {
            return Err(RetouchError::UnsupportedOperation { operation: kind.to_string() });
        }
    };

    debug!(tag = %kind, operation = %operation.name(), "resolved operation");
    Ok(operation)
}

fn resolve_brightness(params: &Params) -> Result<Operation> {
    let value = params.integer("brightness")?;
    let intensity = u32::try_from(value.unsigned_abs())
        .map_err(|_| params.invalid("brightness", format!("{value} is out of range")))?;

    let brightness = if value >= 0 {
        Brightness::increase(intensity)
    } else {
        Brightness::decrease(intensity)
    };
    Ok(brightness.into())
}

fn resolve_contrast(params: &Params) -> Result<Operation> {
    let value = params.number("contrast")?;
    let factor = value as f32;
    if !factor.is_finite() {
        return Err(params.invalid(
            "contrast",
            format!("{value} is outside the supported range"),
        ));
    }
    Ok(Contrast { factor }.into())
}

fn resolve_crop(params: &Params) -> Result<Operation> {
    Ok(Crop::new(
        params.unsigned("x")?,
        params.unsigned("y")?,
        params.unsigned("width")?,
        params.unsigned("height")?,
    )
    .into())
}

fn resolve_rotate(params: &Params) -> Result<Operation> {
    let angle = match params.required("angle")? {
        Value::String(label) => RightAngle::from_label(label).ok_or_else(|| {
            params.invalid("angle", format!("unsupported angle '{label}', expected 90, 180 or 270"))
        })?,
        Value::Number(number) => {
            let degrees = number.as_f64().unwrap_or(f64::NAN);
            RightAngle::nearest(degrees).ok_or_else(|| {
                params.invalid("angle", format!("{number} degrees does not round to a quarter turn"))
            })?
        }
        other => return Err(params.wrong_type("angle", "a string or number", other)),
    };
    Ok(Rotate { angle }.into())
}

fn resolve_blur(params: &Params) -> Result<Operation> {
    let intensity = match params.required("intensity")? {
        Value::String(name) => name.trim().parse::<BlurIntensity>().map_err(|_| {
            params.invalid("intensity", format!("unknown blur level '{name}'"))
        })?,
        Value::Number(_) => {
            let scale = params.integer("intensity")?;
            let scale = u64::try_from(scale)
                .map_err(|_| params.invalid("intensity", "scale must not be negative"))?;
            BlurIntensity::from_scale(scale)
        }
        other => return Err(params.wrong_type("intensity", "a level name or integer scale", other)),
    };
    Ok(Blur { intensity }.into())
}

/// Typed accessors over a parameter bag, reporting failures against the
/// operation being resolved.
struct Params<'a> {
    kind: OperationKind,
    bag: &'a ParameterBag,
}

impl Params<'_> {
    fn invalid(&self, parameter: &str, message: impl Into<String>) -> RetouchError {
        RetouchError::validation(self.kind.to_string(), Some(parameter), message)
    }

    fn wrong_type(&self, parameter: &str, expected: &str, found: &Value) -> RetouchError {
        self.invalid(
            parameter,
            format!("'{parameter}' must be {expected}, found {}", type_name(found)),
        )
    }

    fn required(&self, parameter: &str) -> Result<&Value> {
        match self.bag.get(parameter) {
            Some(Value::Null) | None => Err(self.invalid(
                parameter,
                format!("missing required parameter '{parameter}'"),
            )),
            Some(value) => Ok(value),
        }
    }

    fn number(&self, parameter: &str) -> Result<f64> {
        match self.required(parameter)? {
            Value::Number(number) => number
                .as_f64()
                .ok_or_else(|| self.invalid(parameter, format!("'{parameter}' is not representable"))),
            other => Err(self.wrong_type(parameter, "a number", other)),
        }
    }

    /// Integers, or floats with no fractional part.
    fn integer(&self, parameter: &str) -> Result<i64> {
        let number = match self.required(parameter)? {
            Value::Number(number) => number,
            other => return Err(self.wrong_type(parameter, "an integer", other)),
        };
        if let Some(value) = number.as_i64() {
            return Ok(value);
        }
        match number.as_f64() {
            Some(value)
                if value.fract() == 0.0 && value >= i64::MIN as f64 && value < i64::MAX as f64 =>
            {
                Ok(value as i64)
            }
            _ => Err(self.invalid(
                parameter,
                format!("'{parameter}' must be an integer, found {number}"),
            )),
        }
    }

    fn unsigned(&self, parameter: &str) -> Result<u32> {
        let value = self.integer(parameter)?;
        u32::try_from(value).map_err(|_| {
            self.invalid(
                parameter,
                format!("'{parameter}' must be a non-negative integer, found {value}"),
            )
        })
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
