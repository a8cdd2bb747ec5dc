//! 服务标识符
//!
//! 容器只接受字符串或整数作为键。静态类型的键（`&str`、`String`、整数）
//! 总是合法的；动态键（`serde_json::Value`）在进入容器前校验，
//! 其它形态一律报 `InvalidIdentifier`。
//!
//! 规范的十进制整数字符串（如 `"5"`、`"-12"`）视为整数键，因此 `"5"` 与 `5`
//! 指向同一个绑定；`"05"`、`"+5"`、`"-0"` 仍是字符串键。
//! 有限的非整数数字向零截断，`1.5` 与 `1` 相同。

use crate::errors::ContainerError;
use serde_json::Value;
use std::fmt;

/// 服务标识符
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ServiceId {
    /// 字符串键
    Name(String),
    /// 整数键
    Index(i64),
}

impl ServiceId {
    /// 由字符串构造标识符，规范整数字符串归一为整数键
    pub fn parse(name: impl Into<String>) -> Self {
        let name = name.into();
        match canonical_index(&name) {
            Some(index) => ServiceId::Index(index),
            None => ServiceId::Name(name),
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            ServiceId::Name(name) => Some(name),
            ServiceId::Index(_) => None,
        }
    }

    pub fn as_index(&self) -> Option<i64> {
        match self {
            ServiceId::Name(_) => None,
            ServiceId::Index(index) => Some(*index),
        }
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceId::Name(name) => f.write_str(name),
            ServiceId::Index(index) => write!(f, "{}", index),
        }
    }
}

impl From<&str> for ServiceId {
    fn from(name: &str) -> Self {
        ServiceId::parse(name)
    }
}

impl From<String> for ServiceId {
    fn from(name: String) -> Self {
        ServiceId::parse(name)
    }
}

/// 不带 `+`、没有前导零、不是 `-0` 且落在 `i64` 范围内的十进制整数
fn canonical_index(name: &str) -> Option<i64> {
    let digits = name.strip_prefix('-').unwrap_or(name);
    let bytes = digits.as_bytes();
    if bytes.is_empty() || !bytes.iter().all(u8::is_ascii_digit) {
        return None;
    }
    if bytes[0] == b'0' && (bytes.len() > 1 || digits.len() != name.len()) {
        return None;
    }
    name.parse().ok()
}

impl From<i64> for ServiceId {
    fn from(index: i64) -> Self {
        ServiceId::Index(index)
    }
}

/// 可以转换为服务标识符的键
///
/// 所有容器操作都通过这个 trait 接受键，校验失败统一映射为
/// [`ContainerError::InvalidIdentifier`]。
pub trait IntoServiceId {
    fn into_service_id(self) -> Result<ServiceId, ContainerError>;
}

impl IntoServiceId for ServiceId {
    fn into_service_id(self) -> Result<ServiceId, ContainerError> {
        Ok(self)
    }
}

impl IntoServiceId for &ServiceId {
    fn into_service_id(self) -> Result<ServiceId, ContainerError> {
        Ok(self.clone())
    }
}

impl IntoServiceId for &str {
    fn into_service_id(self) -> Result<ServiceId, ContainerError> {
        Ok(ServiceId::from(self))
    }
}

impl IntoServiceId for String {
    fn into_service_id(self) -> Result<ServiceId, ContainerError> {
        Ok(ServiceId::parse(self))
    }
}

impl IntoServiceId for &String {
    fn into_service_id(self) -> Result<ServiceId, ContainerError> {
        Ok(ServiceId::parse(self.as_str()))
    }
}

macro_rules! lossless_index {
    ($($ty:ty),*) => {
        $(
            impl IntoServiceId for $ty {
                fn into_service_id(self) -> Result<ServiceId, ContainerError> {
                    Ok(ServiceId::Index(i64::from(self)))
                }
            }
        )*
    };
}

macro_rules! checked_index {
    ($($ty:ty),*) => {
        $(
            impl IntoServiceId for $ty {
                fn into_service_id(self) -> Result<ServiceId, ContainerError> {
                    i64::try_from(self)
                        .map(ServiceId::Index)
                        .map_err(|_| ContainerError::InvalidIdentifier(format!("integer {} out of range", self)))
                }
            }
        )*
    };
}

lossless_index!(i8, i16, i32, i64, u8, u16, u32);
checked_index!(u64, usize, isize);

impl IntoServiceId for &Value {
    fn into_service_id(self) -> Result<ServiceId, ContainerError> {
        match self {
            Value::String(name) => Ok(ServiceId::parse(name.as_str())),
            Value::Number(number) => {
                if let Some(index) = number.as_i64() {
                    return Ok(ServiceId::Index(index));
                }
                // 浮点数向零截断为整数键
                match number.as_f64().map(f64::trunc) {
                    Some(float) if float >= i64::MIN as f64 && float < i64::MAX as f64 => {
                        Ok(ServiceId::Index(float as i64))
                    }
                    _ => Err(ContainerError::InvalidIdentifier(format!("number {}", number))),
                }
            }
            other => Err(ContainerError::InvalidIdentifier(describe(other).to_string())),
        }
    }
}

impl IntoServiceId for Value {
    fn into_service_id(self) -> Result<ServiceId, ContainerError> {
        (&self).into_service_id()
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_static_keys() {
        assert_eq!("db".into_service_id().unwrap(), ServiceId::Name("db".into()));
        assert_eq!(42u8.into_service_id().unwrap(), ServiceId::Index(42));
        assert_eq!((-7i32).into_service_id().unwrap(), ServiceId::Index(-7));
        assert!(matches!(
            u64::MAX.into_service_id(),
            Err(ContainerError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_dynamic_keys() {
        assert_eq!(json!("mailer").into_service_id().unwrap(), ServiceId::from("mailer"));
        assert_eq!(json!(123).into_service_id().unwrap(), ServiceId::Index(123));
        assert_eq!(json!(4.0).into_service_id().unwrap(), ServiceId::Index(4));
        assert_eq!(json!(1.5).into_service_id().unwrap(), ServiceId::Index(1));
        assert_eq!(json!(-2.7).into_service_id().unwrap(), ServiceId::Index(-2));
        assert_eq!(json!("17").into_service_id().unwrap(), ServiceId::Index(17));
        assert!(matches!(
            json!(u64::MAX).into_service_id(),
            Err(ContainerError::InvalidIdentifier(_))
        ));

        for bad in [json!([1, 2]), json!({"a": 1}), json!(null), json!(true)] {
            assert!(
                matches!((&bad).into_service_id(), Err(ContainerError::InvalidIdentifier(_))),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_integer_strings_normalise() {
        assert_eq!("5".into_service_id().unwrap(), ServiceId::Index(5));
        assert_eq!("-12".to_string().into_service_id().unwrap(), ServiceId::Index(-12));
        assert_eq!(ServiceId::from("0"), ServiceId::Index(0));
        assert_eq!(
            ServiceId::from("9223372036854775807"),
            ServiceId::Index(i64::MAX)
        );

        for name in ["05", "+5", "-0", "-", "", "1.5", " 5", "9223372036854775808"] {
            assert_eq!(ServiceId::from(name), ServiceId::Name(name.to_string()), "{:?}", name);
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(ServiceId::from("logger").to_string(), "logger");
        assert_eq!(ServiceId::Index(9).to_string(), "9");
        assert_eq!(ServiceId::from("logger").as_name(), Some("logger"));
        assert_eq!(ServiceId::Index(9).as_index(), Some(9));
        assert_eq!(ServiceId::Index(9).as_name(), None);
    }
}
