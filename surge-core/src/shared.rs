use std::collections::HashMap;
use std::sync::Arc;

/// Value produced by `setup()` and handed to every iteration and to
/// `teardown()`. Shared read-only across all VUs.
pub type SharedData = Arc<SharedValue>;

#[derive(Debug, Clone, PartialEq)]
pub enum SharedValue {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    String(Arc<str>),
    Array(Vec<SharedValue>),
    Object(HashMap<Arc<str>, SharedValue>),
}

impl SharedValue {
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::I64(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&SharedValue> {
        match self {
            Self::Object(map) => map.get(key),
            _ => None,
        }
    }
}

impl From<&str> for SharedValue {
    fn from(v: &str) -> Self {
        Self::String(Arc::from(v))
    }
}
