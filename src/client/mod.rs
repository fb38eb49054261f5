//! Client table and state machine (spec §3, §4.F), grounded in
//! `examples/vibesrc-vibemq/src/session/mod.rs`'s session-table shape.

use std::time::Instant;

use ahash::AHashMap;

use crate::codec::Addr;

/// `ClientState` (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Active,
    Asleep,
    Awake,
    Lost,
}

/// `ClientType` (spec §3). A client is promoted from `Unknown` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientType {
    Unknown,
    Publisher,
    Subscriber,
}

#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub client_id: String,
    pub keep_alive_duration: std::time::Duration,
    pub sleep_duration: std::time::Duration,
    pub current_state: ClientState,
    pub client_type: ClientType,
    pub last_received_at: Instant,
    pub sent_ping_req: bool,
}

impl ClientInfo {
    pub fn new(client_id: String, now: Instant) -> Self {
        Self {
            client_id,
            keep_alive_duration: std::time::Duration::ZERO,
            sleep_duration: std::time::Duration::ZERO,
            current_state: ClientState::Disconnected,
            client_type: ClientType::Unknown,
            last_received_at: now,
            sent_ping_req: false,
        }
    }

    /// Promote `Unknown` to a concrete type exactly once; no-op otherwise.
    pub fn promote(&mut self, ty: ClientType) {
        if self.client_type == ClientType::Unknown {
            self.client_type = ty;
        }
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_received_at = now;
    }
}

/// Keyed by `(networkAddress, udpPort)` per spec §3.
#[derive(Debug, Default)]
pub struct ClientTable {
    clients: AHashMap<Addr, ClientInfo>,
    max_clients: usize,
}

impl ClientTable {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: AHashMap::new(),
            max_clients,
        }
    }

    pub fn get(&self, addr: Addr) -> Option<&ClientInfo> {
        self.clients.get(&addr)
    }

    pub fn get_mut(&mut self, addr: Addr) -> Option<&mut ClientInfo> {
        self.clients.get_mut(&addr)
    }

    /// Congestion test from spec §4.F / §5 resource policy: a *new* record
    /// is admitted only if the table has not reached `maximumClients`.
    pub fn congested(&self) -> bool {
        self.clients.len() >= self.max_clients
    }

    pub fn insert(&mut self, addr: Addr, info: ClientInfo) {
        self.clients.insert(addr, info);
    }

    pub fn remove(&mut self, addr: Addr) -> Option<ClientInfo> {
        self.clients.remove(&addr)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Addr, &ClientInfo)> {
        self.clients.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&Addr, &mut ClientInfo)> {
        self.clients.iter_mut()
    }

    pub fn find_by_client_id(&self, client_id: &str) -> Option<(Addr, &ClientInfo)> {
        self.clients
            .iter()
            .find(|(_, info)| info.client_id == client_id)
            .map(|(addr, info)| (*addr, info))
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

/// Coarse classification of the per-type state precondition table (spec
/// §4.F): which client states a packet type is permitted to arrive in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreconditionClass {
    /// WILLTOPIC, WILLTOPICUPD, WILLMSG, WILLMSGUPD, PINGRESP, REGISTER,
    /// PUBLISH(QoS>=0), PUBREL, SUBSCRIBE, UNSUBSCRIBE, REGACK.
    Active,
    /// PUBACK, PUBREC, PUBCOMP.
    ActiveOrAwake,
    /// PINGREQ, DISCONNECT.
    ActiveOrAsleep,
    /// SEARCHGW, CONNECT, PUBLISH(QoS=-1): no precondition.
    None,
}

impl PreconditionClass {
    pub fn allows(self, state: ClientState) -> bool {
        match self {
            Self::Active => state == ClientState::Active,
            Self::ActiveOrAwake => matches!(state, ClientState::Active | ClientState::Awake),
            Self::ActiveOrAsleep => matches!(state, ClientState::Active | ClientState::Asleep),
            Self::None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotion_is_sticky() {
        let mut info = ClientInfo::new("c1".into(), Instant::now());
        info.promote(ClientType::Publisher);
        info.promote(ClientType::Subscriber);
        assert_eq!(info.client_type, ClientType::Publisher);
    }

    #[test]
    fn table_congestion_at_capacity() {
        let mut table = ClientTable::new(1);
        assert!(!table.congested());
        table.insert(
            "127.0.0.1:1".parse().unwrap(),
            ClientInfo::new("c1".into(), Instant::now()),
        );
        assert!(table.congested());
    }

    #[test]
    fn precondition_classes_match_spec_table() {
        assert!(PreconditionClass::Active.allows(ClientState::Active));
        assert!(!PreconditionClass::Active.allows(ClientState::Awake));
        assert!(PreconditionClass::ActiveOrAwake.allows(ClientState::Awake));
        assert!(PreconditionClass::ActiveOrAsleep.allows(ClientState::Asleep));
        assert!(PreconditionClass::None.allows(ClientState::Disconnected));
    }
}
