//! Value types relayed between the broker, the history buffer, and observers

use serde::{Deserialize, Serialize};

/// An immutable keyed message.
///
/// Constructed either from a caller request (publish side) or by decoding a
/// broker record (consume side). The non-empty-key rule is enforced at the
/// publish boundary by [`crate::Publisher`]; decoded records keep whatever
/// key the broker delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub key: String,
    pub value: String,
}

impl Message {
    /// Create a new message
    pub fn new<K: Into<String>, V: Into<String>>(key: K, value: V) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Broker acknowledgment for a published message.
///
/// Position metadata is present when the broker reports it and omitted
/// otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishAck {
    pub topic: String,
    pub key: String,
    pub partition: Option<i32>,
    pub offset: Option<i64>,
}
