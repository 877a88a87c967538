use std::fmt::{self, Display};

// Helper macro to define aggregate ID newtypes and common trait impls.
// Ids are opaque strings minted by the id generator.
macro_rules! define_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub struct $name(String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(UserId);
define_id!(PlaylistId);
define_id!(PlaylistItemId);
define_id!(MediaId);
define_id!(HistoryEntryId);

// 媒体来源类型（如 "youtube"、"soundcloud"），由外部适配器提供
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceType(String);

impl SourceType {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SourceType {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SourceType {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 媒体的全局唯一定位：(来源类型, 来源内 ID)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceRef {
    pub source_type: SourceType,
    pub source_id: String,
}

impl SourceRef {
    pub fn new(source_type: SourceType, source_id: impl Into<String>) -> Self {
        Self {
            source_type,
            source_id: source_id.into(),
        }
    }
}

impl Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source_type, self.source_id)
    }
}
