//! Topic registry (spec §4.D), grounded in
//! `examples/vibesrc-vibemq/src/topic/mod.rs`'s table-of-maps layout,
//! adapted from trie-based filter matching to MQTT-SN's exact name↔id map.

use std::collections::HashMap;

use ahash::AHashMap;
use base64::Engine;

use crate::codec::TopicIdType;
use crate::error::Trap;
use crate::ids::IdSpace;

pub const MIN_TOPIC_LEN: usize = 2;

/// Stable base64 map key (spec §4.D: "preserved verbatim as a contract so
/// keys remain stable across versions").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EncodedTopicName(String);

impl EncodedTopicName {
    pub fn encode(name: &str) -> Self {
        Self(base64::engine::general_purpose::STANDARD.encode(sanitize(name).as_bytes()))
    }
}

/// Strip whitespace before lookup and before base64 encoding (spec §4.D).
/// Topic names are otherwise opaque byte strings.
fn sanitize(name: &str) -> String {
    name.chars().filter(|c| !c.is_whitespace()).collect()
}

#[derive(Debug, Clone)]
pub struct TopicInfo {
    pub name: String,
    pub topic_id_type: TopicIdType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterTopicError {
    InvalidName,
    Congested,
}

impl std::fmt::Display for RegisterTopicError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName => write!(f, "invalid topic name"),
            Self::Congested => write!(f, "topic id space is congested"),
        }
    }
}

impl std::error::Error for RegisterTopicError {}

/// `nameToId`/`idToInfo`/`usedIds`/`nextId` from spec §3, plus the shared
/// id-space allocator from §4.E.
#[derive(Debug, Default)]
pub struct TopicRegistry {
    name_to_id: AHashMap<EncodedTopicName, u16>,
    id_to_info: AHashMap<u16, TopicInfo>,
    ids: IdSpace,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self {
            name_to_id: AHashMap::new(),
            id_to_info: AHashMap::new(),
            ids: IdSpace::new(false),
        }
    }

    pub fn encode(name: &str) -> EncodedTopicName {
        EncodedTopicName::encode(name)
    }

    /// `registerTopic` (spec §4.D).
    pub fn register_topic(&mut self, name: &str) -> Result<(u16, bool), RegisterTopicError> {
        let key = Self::encode(name);
        if let Some(&id) = self.name_to_id.get(&key) {
            return Ok((id, false));
        }
        let sanitized = sanitize(name);
        if sanitized.len() < MIN_TOPIC_LEN {
            return Err(RegisterTopicError::InvalidName);
        }
        let id = self
            .ids
            .next_id()
            .ok_or(RegisterTopicError::Congested)?;
        self.ids.reserve(id);
        let topic_id_type = if sanitized.len() == 2 {
            TopicIdType::Short
        } else {
            TopicIdType::Normal
        };
        self.name_to_id.insert(key, id);
        self.id_to_info.insert(
            id,
            TopicInfo {
                name: sanitized,
                topic_id_type,
            },
        );
        self.check_invariant();
        Ok((id, true))
    }

    pub fn lookup_by_name(&self, name: &str) -> Option<u16> {
        self.name_to_id.get(&Self::encode(name)).copied()
    }

    pub fn lookup_by_id(&self, id: u16) -> Option<&TopicInfo> {
        self.id_to_info.get(&id)
    }

    /// Seed predefined topics at boot, reserving their ids permanently
    /// (spec §4.D: "never reallocated").
    pub fn seed_predefined(&mut self, map: &HashMap<String, u16>) {
        for (name, &id) in map {
            self.ids.reserve(id);
            self.name_to_id.insert(Self::encode(name), id);
            self.id_to_info.insert(
                id,
                TopicInfo {
                    name: sanitize(name),
                    topic_id_type: TopicIdType::Predefined,
                },
            );
        }
        self.check_invariant();
    }

    pub fn congested(&self) -> bool {
        self.ids.congested()
    }

    fn check_invariant(&self) {
        if self.name_to_id.len() != self.id_to_info.len() {
            Trap::TopicRegistryMirrorMismatch.raise();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_and_reuses_ids() {
        let mut reg = TopicRegistry::new();
        let (id1, created1) = reg.register_topic("sensors/temp").unwrap();
        assert!(created1);
        let (id2, created2) = reg.register_topic("sensors/temp").unwrap();
        assert_eq!(id1, id2);
        assert!(!created2);
    }

    #[test]
    fn short_names_are_classified_short() {
        let mut reg = TopicRegistry::new();
        let (id, _) = reg.register_topic("ab").unwrap();
        assert_eq!(reg.lookup_by_id(id).unwrap().topic_id_type, TopicIdType::Short);
    }

    #[test]
    fn name_below_min_len_is_rejected() {
        let mut reg = TopicRegistry::new();
        assert!(reg.register_topic("a").is_err());
    }

    #[test]
    fn sanitizes_whitespace_before_matching() {
        let mut reg = TopicRegistry::new();
        let (id, _) = reg.register_topic("a b/c").unwrap();
        assert_eq!(reg.lookup_by_name("a b/c"), Some(id));
        assert_eq!(reg.lookup_by_name("ab/c"), Some(id));
    }

    #[test]
    fn predefined_topics_are_never_reallocated() {
        let mut reg = TopicRegistry::new();
        let mut predefined = HashMap::new();
        predefined.insert("status".to_owned(), 1u16);
        reg.seed_predefined(&predefined);
        let (id, created) = reg.register_topic("other").unwrap();
        assert!(created);
        assert_ne!(id, 1);
    }
}
