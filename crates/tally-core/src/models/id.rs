//! Client-generated entity identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new unique ID using UUID v7 (time-sortable)
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Get the string representation of this ID
            #[must_use]
            pub fn as_str(&self) -> String {
                self.0.to_string()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

entity_id!(
    /// A unique identifier for an expense
    ExpenseId
);

entity_id!(
    /// A unique identifier for a category
    CategoryId
);

/// Namespace for the ids of built-in categories
const DEFAULT_CATEGORY_NAMESPACE: Uuid = Uuid::from_u128(0x6c1f_0a9e_3b52_4d7a_9e08_27f4_b1c3_d5e6);

impl CategoryId {
    /// The id of a built-in category. Every device derives the same id from
    /// the same name, so expenses synced between devices resolve to it.
    #[must_use]
    pub fn for_default(name: &str) -> Self {
        Self(Uuid::new_v5(&DEFAULT_CATEGORY_NAMESPACE, name.as_bytes()))
    }
}

entity_id!(
    /// A unique identifier for a queued sync action
    ActionId
);
