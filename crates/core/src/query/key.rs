use std::fmt;
use std::sync::Arc;

use ridealong_transit::identifiers::*;
use ridealong_transit::SourceTag;

/// One primitive of a cache key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum KeyPart {
    Str(Arc<str>),
    Int(i64),
    Bool(bool),
    /// Version of a resolved upstream value.
    Version(u64),
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Str(s) => write!(f, "{}", s),
            KeyPart::Int(i) => write!(f, "{}", i),
            KeyPart::Bool(b) => write!(f, "{}", b),
            KeyPart::Version(v) => write!(f, "v{}", v),
        }
    }
}

impl From<&str> for KeyPart {
    fn from(s: &str) -> Self {
        KeyPart::Str(s.into())
    }
}

impl From<String> for KeyPart {
    fn from(s: String) -> Self {
        KeyPart::Str(s.into())
    }
}

impl From<Arc<str>> for KeyPart {
    fn from(s: Arc<str>) -> Self {
        KeyPart::Str(s)
    }
}

impl From<i64> for KeyPart {
    fn from(i: i64) -> Self {
        KeyPart::Int(i)
    }
}

impl From<u32> for KeyPart {
    fn from(i: u32) -> Self {
        KeyPart::Int(i.into())
    }
}

impl From<bool> for KeyPart {
    fn from(b: bool) -> Self {
        KeyPart::Bool(b)
    }
}

impl From<SourceTag> for KeyPart {
    fn from(tag: SourceTag) -> Self {
        KeyPart::Str(tag.to_string().into())
    }
}

macro_rules! impl_identifier_key_part {
    ($($name:ident),*) => {
        $(
            impl From<&$name> for KeyPart {
                fn from(id: &$name) -> Self {
                    KeyPart::Str(id.as_str().into())
                }
            }
        )*
    };
}

impl_identifier_key_part!(
    RouteIdentifier,
    DirectionIdentifier,
    StopIdentifier,
    VehicleIdentifier,
    TripPointIdentifier
);

/// Ordered primitives identifying a cached value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct QueryKey(Vec<KeyPart>);

impl QueryKey {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, part: impl Into<KeyPart>) -> Self {
        self.0.push(part.into());
        self
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{}", part)?;
        }
        Ok(())
    }
}

/// Build a [`QueryKey`] from primitives.
///
/// ```
/// use ridealong_core::query_key;
///
/// let key = query_key!("bustime", "routes", 4u32);
/// assert_eq!(key.to_string(), "bustime/routes/4");
/// ```
#[macro_export]
macro_rules! query_key {
    ($($part:expr),* $(,)?) => {
        $crate::query::QueryKey::new()$(.with($part))*
    };
}
