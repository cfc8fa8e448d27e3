//! Direct message wire shape.
//!
//! Both history frames and live frames use the same JSON object:
//! `{"from": "...", "to": "...", "msg": "..."}`. Clients may send `from`/`to`
//! but the server overrides them with the session's identity and peer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::UserId;

/// An immutable direct message between two users.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Sender.
    pub from: UserId,
    /// Recipient.
    pub to: UserId,
    /// Message body.
    pub msg: String,
}

impl ChatMessage {
    /// Build a message, rejecting empty fields.
    pub fn new(
        from: UserId,
        to: UserId,
        msg: impl Into<String>,
    ) -> Result<Self, EnvelopeError> {
        let msg = msg.into();
        if from.is_empty() {
            return Err(EnvelopeError::MissingSender);
        }
        if to.is_empty() {
            return Err(EnvelopeError::MissingRecipient);
        }
        if msg.is_empty() {
            return Err(EnvelopeError::EmptyBody);
        }
        Ok(Self { from, to, msg })
    }

    /// Whether `{from, to}` is exactly the unordered pair `{a, b}`.
    pub fn is_between(&self, a: &UserId, b: &UserId) -> bool {
        (self.from == *a && self.to == *b) || (self.from == *b && self.to == *a)
    }

    /// Serialize to the JSON text frame sent over the channel.
    pub fn to_frame(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Reasons an inbound frame cannot become a [`ChatMessage`].
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// Frame was not a JSON object of the expected shape.
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),
    /// Session has no authenticated sender.
    #[error("message has no sender")]
    MissingSender,
    /// Session was opened without a peer, so there is nobody to address.
    #[error("message has no recipient")]
    MissingRecipient,
    /// `msg` was empty.
    #[error("message body is empty")]
    EmptyBody,
}

/// A frame as sent by a client, before the server binds identities.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct InboundEnvelope {
    /// Client-claimed sender; ignored.
    #[serde(default)]
    pub from: Option<String>,
    /// Client-claimed recipient; ignored.
    #[serde(default)]
    pub to: Option<String>,
    /// Body.
    #[serde(default)]
    pub msg: String,
}

impl InboundEnvelope {
    /// Decode a text frame.
    pub fn parse(frame: &str) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_str(frame)?)
    }

    /// Bind the envelope to the session's identity and peer.
    ///
    /// The client's `from`/`to` are discarded.
    pub fn into_message(
        self,
        sender: &UserId,
        peer: Option<&UserId>,
    ) -> Result<ChatMessage, EnvelopeError> {
        let to = peer.cloned().ok_or(EnvelopeError::MissingRecipient)?;
        ChatMessage::new(sender.clone(), to, self.msg)
    }
}
