//! String-to-value conversion and the `Bindable` trait implemented by every
//! field type a parameter object can expose.

use std::path::PathBuf;

pub use clasp_metadata::{Value, ValueKind};

use crate::error::BindError;

/// A scalar type that can receive a converted value.
///
/// `#[derive(Command)]` relies on this trait for every option/value field;
/// `Option<T>` and `Vec<T>` fields are handled by the derive itself.
pub trait Bindable: Sized {
    fn kind() -> ValueKind;
    fn from_value(value: Value) -> Result<Self, BindError>;
}

/// Convert raw command-line text into a value of `kind`.
///
/// On failure the error message names the expected kind.
pub fn convert(kind: &ValueKind, raw: &str) -> Result<Value, String> {
    match kind {
        ValueKind::Bool => parse_bool(raw)
            .map(Value::Bool)
            .ok_or_else(|| expected(kind)),
        ValueKind::Int => raw
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| expected(kind)),
        ValueKind::UInt => raw
            .trim()
            .parse::<u64>()
            .map(Value::UInt)
            .map_err(|_| expected(kind)),
        ValueKind::Float => raw
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| expected(kind)),
        ValueKind::Str => Ok(Value::Str(raw.to_string())),
        ValueKind::Enum(choices) => choices
            .iter()
            .find(|c| c.eq_ignore_ascii_case(raw.trim()))
            .map(|c| Value::Enum(c.clone()))
            .ok_or_else(|| expected(kind)),
    }
}

/// Coerce an already-typed value (typically a declared default) to `kind`.
pub fn coerce(kind: &ValueKind, value: Value) -> Result<Value, String> {
    match (kind, value) {
        (_, Value::List(items)) => items
            .into_iter()
            .map(|item| coerce(kind, item))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        (ValueKind::Bool, v @ Value::Bool(_)) => Ok(v),
        (ValueKind::Int, v @ Value::Int(_)) => Ok(v),
        (ValueKind::Int, Value::UInt(n)) => i64::try_from(n)
            .map(Value::Int)
            .map_err(|_| expected(kind)),
        (ValueKind::UInt, v @ Value::UInt(_)) => Ok(v),
        (ValueKind::UInt, Value::Int(n)) => u64::try_from(n)
            .map(Value::UInt)
            .map_err(|_| expected(kind)),
        (ValueKind::Float, v @ Value::Float(_)) => Ok(v),
        (ValueKind::Float, Value::Int(n)) => Ok(Value::Float(n as f64)),
        (ValueKind::Float, Value::UInt(n)) => Ok(Value::Float(n as f64)),
        (ValueKind::Str, Value::Str(s)) => Ok(Value::Str(s)),
        (ValueKind::Enum(_), Value::Enum(s)) | (_, Value::Str(s)) => convert(kind, &s),
        (_, other) => Err(format!("{other} is not {}", kind.describe())),
    }
}

fn expected(kind: &ValueKind) -> String {
    format!("expected {}", kind.describe())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn mismatch<T>(value: &Value, kind: ValueKind) -> Result<T, BindError> {
    Err(BindError::TypeMismatch {
        expected: kind.describe(),
        found: value.to_string(),
    })
}

impl Bindable for bool {
    fn kind() -> ValueKind {
        ValueKind::Bool
    }

    fn from_value(value: Value) -> Result<Self, BindError> {
        match value {
            Value::Bool(v) => Ok(v),
            other => mismatch(&other, Self::kind()),
        }
    }
}

impl Bindable for String {
    fn kind() -> ValueKind {
        ValueKind::Str
    }

    fn from_value(value: Value) -> Result<Self, BindError> {
        match value {
            Value::Str(v) | Value::Enum(v) => Ok(v),
            other => Ok(other.to_string()),
        }
    }
}

impl Bindable for PathBuf {
    fn kind() -> ValueKind {
        ValueKind::Str
    }

    fn from_value(value: Value) -> Result<Self, BindError> {
        String::from_value(value).map(PathBuf::from)
    }
}

macro_rules! bindable_signed {
    ($($ty:ty),*) => {$(
        impl Bindable for $ty {
            fn kind() -> ValueKind {
                ValueKind::Int
            }

            fn from_value(value: Value) -> Result<Self, BindError> {
                let wide = match value {
                    Value::Int(v) => v,
                    Value::UInt(v) => i64::try_from(v).map_err(|_| BindError::OutOfRange {
                        value: v.to_string(),
                        ty: stringify!($ty),
                    })?,
                    other => return mismatch(&other, Self::kind()),
                };
                <$ty>::try_from(wide).map_err(|_| BindError::OutOfRange {
                    value: wide.to_string(),
                    ty: stringify!($ty),
                })
            }
        }
    )*};
}

macro_rules! bindable_unsigned {
    ($($ty:ty),*) => {$(
        impl Bindable for $ty {
            fn kind() -> ValueKind {
                ValueKind::UInt
            }

            fn from_value(value: Value) -> Result<Self, BindError> {
                let wide = match value {
                    Value::UInt(v) => v,
                    Value::Int(v) => u64::try_from(v).map_err(|_| BindError::OutOfRange {
                        value: v.to_string(),
                        ty: stringify!($ty),
                    })?,
                    other => return mismatch(&other, Self::kind()),
                };
                <$ty>::try_from(wide).map_err(|_| BindError::OutOfRange {
                    value: wide.to_string(),
                    ty: stringify!($ty),
                })
            }
        }
    )*};
}

bindable_signed!(i8, i16, i32, i64, isize);
bindable_unsigned!(u8, u16, u32, u64, usize);

impl Bindable for f64 {
    fn kind() -> ValueKind {
        ValueKind::Float
    }

    fn from_value(value: Value) -> Result<Self, BindError> {
        match value {
            Value::Float(v) => Ok(v),
            Value::Int(v) => Ok(v as f64),
            Value::UInt(v) => Ok(v as f64),
            other => mismatch(&other, Self::kind()),
        }
    }
}

impl Bindable for f32 {
    fn kind() -> ValueKind {
        ValueKind::Float
    }

    fn from_value(value: Value) -> Result<Self, BindError> {
        f64::from_value(value).map(|v| v as f32)
    }
}

/// Define a fieldless enum that binds by variant name (case-insensitive).
///
/// ```
/// clasp::value_enum! {
///     #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
///     pub enum Profile {
///         #[default]
///         Debug,
///         Release,
///     }
/// }
///
/// use clasp::{Bindable, Value};
/// assert_eq!(Profile::from_value(Value::Enum("Release".into())).unwrap(), Profile::Release);
/// ```
#[macro_export]
macro_rules! value_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis enum $name {
            $( $(#[$vmeta])* $variant ),*
        }

        impl $crate::Bindable for $name {
            fn kind() -> $crate::ValueKind {
                $crate::ValueKind::Enum(vec![$( stringify!($variant).to_string() ),*])
            }

            fn from_value(value: $crate::Value) -> ::std::result::Result<Self, $crate::BindError> {
                let name = match value {
                    $crate::Value::Enum(name) | $crate::Value::Str(name) => name,
                    other => {
                        return Err($crate::BindError::TypeMismatch {
                            expected: <Self as $crate::Bindable>::kind().describe(),
                            found: other.to_string(),
                        })
                    }
                };
                $(
                    if name.eq_ignore_ascii_case(stringify!($variant)) {
                        return Ok(Self::$variant);
                    }
                )*
                Err($crate::BindError::UnknownVariant(name))
            }
        }
    };
}
