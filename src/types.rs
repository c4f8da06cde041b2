//! NewType wrappers for strong typing throughout the gateway.
//!
//! These types prevent accidental mixing of semantically different strings
//! (e.g., passing a store key where a bare visitor token is expected).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Macro to generate a NewType wrapper with standard trait implementations.
macro_rules! newtype_string {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Get the inner value as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume and return the inner String.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

/// Prefix shared by every visitor record in the identity store.
pub const VISITOR_KEY_PREFIX: &str = "visitor";

newtype_string!(
    /// Opaque visitor token.
    ///
    /// This is both the cookie value handed to the client and the suffix of
    /// the store key (`visitor:<token>`). It carries no meaning of its own;
    /// everything known about the visitor lives in the store.
    VisitorToken
);

newtype_string!(
    /// Fully qualified store key for a visitor record (e.g., "visitor:abc123").
    VisitorKey
);

impl VisitorToken {
    /// Store key under which this token's identity record lives.
    pub fn store_key(&self) -> VisitorKey {
        VisitorKey::new(format!("{}:{}", VISITOR_KEY_PREFIX, self.0))
    }

    /// Short SHA-256 fingerprint of the token, safe to put in logs.
    ///
    /// The raw token is a bearer credential and must never be logged.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        format!("{:x}", digest)[..12].to_string()
    }
}
