//! Crate-level error types
//!
//! Follows the taxonomy in the spec's error handling design: protocol
//! violations and rejections are ordinary return values (a REGACK or SUBACK
//! carrying a non-ACCEPTED return code), not `Result::Err`. The only error
//! type the core itself produces is a trap on detected internal
//! inconsistency; everything else that can fail crossing a process boundary
//! (config loading, socket I/O, wire decoding) gets its own error enum.

use std::fmt;

/// A detected violation of a core invariant (see spec §8). These indicate a
/// code bug, not adversarial input, and are never recoverable in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trap {
    /// Reserved id 0 found in a used-id set.
    ReservedIdInUse { space: &'static str },
    /// `UINT16_MAX` found in a set that must not contain it.
    MaxIdInDisallowedSpace { space: &'static str },
    /// `nameToId`/`idToInfo` mirrors diverged.
    TopicRegistryMirrorMismatch,
    /// A `RequestInfo` had zero or both of `messagesKey`/`retainMessagesKey` set.
    RequestKeyInvariantViolated,
    /// A subscriber record was missing where the protocol guarantees presence.
    MissingSubscriber,
    /// REGACK carried `topicId == 0`.
    RegAckZeroTopicId,
    /// `messages`/`messageIds` mirror sets diverged.
    MessageStoreMirrorMismatch,
}

impl fmt::Display for Trap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReservedIdInUse { space } => {
                write!(f, "reserved id 0 found in used-id set for {space}")
            }
            Self::MaxIdInDisallowedSpace { space } => {
                write!(f, "UINT16_MAX found in disallowed id space {space}")
            }
            Self::TopicRegistryMirrorMismatch => {
                write!(f, "topic registry name/id maps are no longer inverse")
            }
            Self::RequestKeyInvariantViolated => write!(
                f,
                "request references zero or both of messagesKey/retainMessagesKey"
            ),
            Self::MissingSubscriber => write!(f, "subscriber record missing during protocol step that guarantees it"),
            Self::RegAckZeroTopicId => write!(f, "REGACK carried topicId == 0"),
            Self::MessageStoreMirrorMismatch => {
                write!(f, "message store id mirror sets diverged")
            }
        }
    }
}

impl std::error::Error for Trap {}

impl Trap {
    /// Raise the trap: log it and abort the process. Called at the point an
    /// invariant violation is detected, never propagated as a `Result`.
    #[track_caller]
    pub fn raise(self) -> ! {
        panic!("mqtt-sn gateway invariant violated: {self}");
    }
}

/// Errors surfaced by configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Config(config::ConfigError),
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "IO error: {e}"),
            Self::Parse(e) => write!(f, "parse error: {e}"),
            Self::Config(e) => write!(f, "config error: {e}"),
            Self::Validation(msg) => write!(f, "validation error: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        Self::Parse(e)
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e)
    }
}

/// Errors surfaced by the transport layer (UDP I/O).
#[derive(Debug)]
pub enum TransportError {
    Io(std::io::Error),
    /// Datagram did not fit the configured maximum transmission unit.
    DatagramTooLarge { len: usize, max: usize },
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "transport IO error: {e}"),
            Self::DatagramTooLarge { len, max } => {
                write!(f, "datagram of {len} bytes exceeds maximum of {max}")
            }
        }
    }
}

impl std::error::Error for TransportError {}

impl From<std::io::Error> for TransportError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
