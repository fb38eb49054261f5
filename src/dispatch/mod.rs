//! Dispatch / fan-out (spec §4.M): turns one inbound PUBLISH into a set of
//! subscriber-bound requests or immediate sends.

use smallvec::SmallVec;

use crate::client::{ClientState, ClientTable};
use crate::codec::{Addr, QoS, TopicIdType};
use crate::subscriber::SubscriberTable;

/// Fan-out lists are almost always a handful of subscribers; inline storage
/// avoids a heap allocation on the common single- or few-subscriber PUBLISH.
pub type FanoutTargets = SmallVec<[FanoutTarget; 4]>;

/// What the core should do for a single `(subscriber, qos)` fan-out target,
/// decided purely from subscriber state (spec §4.M steps).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanoutAction {
    /// Topic registered for this subscriber: deliver now via the request
    /// engine's `addAndSend` path.
    AddAndSend,
    /// Topic not yet registered: kick a REGISTER exchange and buffer.
    RegisterThenBuffer,
    /// Asleep: buffer for later drain, no immediate action.
    Buffer,
    /// Any other state: skip entirely.
    Skip,
}

/// One fan-out target resolved from the subscription index.
#[derive(Debug, Clone, Copy)]
pub struct FanoutTarget {
    pub subscriber: Addr,
    pub topic_id: u16,
    /// The raw QoS this subscriber subscribed at, before minimizing against
    /// the message's QoS. Stored on any resulting RequestInfo so the
    /// periodic sweep (spec §4.K step e) can recompute `effectiveQoS`
    /// itself rather than freezing it at dispatch time.
    pub subscription_qos: QoS,
    pub effective_qos: QoS,
    pub action: FanoutAction,
}

/// Resolve every subscriber of `topic_id` into a `FanoutTarget` (spec §4.M
/// steps 1-2). Does not mutate any table; the caller applies the resulting
/// actions (creating RequestInfo rows, kicking registration, etc).
pub fn resolve_targets(
    topic_id: u16,
    message_qos: QoS,
    clients: &ClientTable,
    subs: &SubscriberTable,
) -> FanoutTargets {
    let mut targets = SmallVec::new();
    for q in subs.qos_levels_for(topic_id) {
        for subscriber in subs.subscribers_of(topic_id, q) {
            let effective_qos = q.min(message_qos);
            let state = clients.get(subscriber).map(|c| c.current_state);
            let action = match state {
                Some(ClientState::Active) => {
                    let registered = subs
                        .get(subscriber)
                        .and_then(|info| info.subscriber_topics.get(&topic_id))
                        .map(|t| t.is_registered)
                        .unwrap_or(false);
                    if registered {
                        FanoutAction::AddAndSend
                    } else {
                        FanoutAction::RegisterThenBuffer
                    }
                }
                Some(ClientState::Awake) => FanoutAction::AddAndSend,
                Some(ClientState::Asleep) => FanoutAction::Buffer,
                _ => FanoutAction::Skip,
            };
            targets.push(FanoutTarget {
                subscriber,
                topic_id,
                subscription_qos: q,
                effective_qos,
                action,
            });
        }
    }
    targets
}

/// Whether at least one target in a fan-out list requires a MessageStore row
/// (spec §4.M "message store economy": fan-outs that can't be sent on the
/// spot share one entry, allocated at most once per inbound PUBLISH).
///
/// An immediate `AddAndSend` at effective QoS 0/-1 carries its payload
/// straight into the outbound `Publish` and needs no row. Everything else
/// that isn't skipped — QoS 1/2 `AddAndSend`, and `RegisterThenBuffer`/
/// `Buffer` at any QoS — defers through a `RequestInfo`, which needs the
/// payload to outlive this call.
pub fn needs_message_row(targets: &[FanoutTarget]) -> bool {
    targets.iter().any(|t| {
        t.action != FanoutAction::Skip
            && !(t.action == FanoutAction::AddAndSend && t.effective_qos <= QoS::Zero)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientInfo, ClientType};
    use std::time::Instant;

    fn addr(n: u16) -> Addr {
        format!("127.0.0.1:{n}").parse().unwrap()
    }

    #[test]
    fn active_unregistered_subscriber_gets_register_then_buffer() {
        let mut clients = ClientTable::new(10);
        let mut client = ClientInfo::new("c1".into(), Instant::now());
        client.current_state = ClientState::Active;
        client.client_type = ClientType::Subscriber;
        clients.insert(addr(1), client);

        let mut subs = SubscriberTable::new();
        subs.subscribe(addr(1), 5, TopicIdType::Normal, QoS::One);

        let targets = resolve_targets(5, QoS::One, &clients, &subs);
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].action, FanoutAction::RegisterThenBuffer);
    }

    #[test]
    fn asleep_subscriber_is_buffered_not_sent() {
        let mut clients = ClientTable::new(10);
        let mut client = ClientInfo::new("c1".into(), Instant::now());
        client.current_state = ClientState::Asleep;
        clients.insert(addr(1), client);

        let mut subs = SubscriberTable::new();
        subs.subscribe(addr(1), 5, TopicIdType::Normal, QoS::One);

        let targets = resolve_targets(5, QoS::One, &clients, &subs);
        assert_eq!(targets[0].action, FanoutAction::Buffer);
    }

    #[test]
    fn disconnected_subscriber_is_skipped() {
        let clients = ClientTable::new(10);
        let mut subs = SubscriberTable::new();
        subs.subscribe(addr(1), 5, TopicIdType::Normal, QoS::One);
        let targets = resolve_targets(5, QoS::One, &clients, &subs);
        // no ClientInfo at all (not even Disconnected) -> Skip.
        assert_eq!(targets[0].action, FanoutAction::Skip);
    }
}
