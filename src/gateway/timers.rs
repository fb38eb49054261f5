//! Timer-driven orchestration (spec §4.N): lifecycle transitions and every
//! periodic sweep. Mirrors the fixed-schedule event list
//! `examples/vibesrc-vibemq/src/broker/housekeeping.rs` drives for session
//! expiry and retry sweeps, generalized to the gateway's larger set of
//! independently-configured intervals.

use std::time::Instant;

use crate::clock::TimerHandle;

use super::{GatewayCore, GatewayState, Outbound};

/// What a fired timer was for. The driving loop (`gateway::channel`) keeps
/// the `TimerHandle -> TimerPurpose` mapping; `GatewayCore` never sees a
/// bare handle, only the purpose it was registered for.
///
/// There is no per-subscriber awaken timer: `AwakenSubscriberCheck` already
/// polls every Awake subscriber on a fixed interval, which both releases a
/// subscriber once its awake-drain empties and enforces the budget cap
/// (spec §4.K awake-drain), so a per-subscriber schedule would only add a
/// timer without changing observable behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPurpose {
    LifecycleTransition,
    Advertise,
    ActiveClientsCheck,
    AsleepClientsCheck,
    AwakenSubscriberCheck,
    PendingRetainCheck,
    RequestsCheck,
    RegistrationsCheck,
    MessagesClear,
}

/// A request to arm a new timer, returned by `GatewayCore` to the async
/// driving loop which owns the actual `TimerService`.
#[derive(Debug, Clone, Copy)]
pub struct TimerRequest {
    pub purpose: TimerPurpose,
    pub after: std::time::Duration,
}

impl GatewayCore {
    /// Boot sequence (spec §4.N): start Offline, schedule the transition to
    /// Online after `offlineStateInterval`.
    pub fn start(&mut self, _now: Instant) -> Vec<TimerRequest> {
        self.state = GatewayState::Offline;
        vec![TimerRequest {
            purpose: TimerPurpose::LifecycleTransition,
            after: self.config.timers.offline_state_interval,
        }]
    }

    /// Handle a fired timer, returning outbound packets, any newly-armed
    /// timers, and any timers to cancel (used only by the awaken-check
    /// timer, which is per-subscriber and torn down once drained).
    pub fn handle_timer(
        &mut self,
        now: Instant,
        purpose: TimerPurpose,
    ) -> (Vec<Outbound>, Vec<TimerRequest>, Vec<TimerHandle>) {
        match purpose {
            TimerPurpose::LifecycleTransition => self.on_lifecycle_transition(),
            TimerPurpose::Advertise => self.on_advertise(),
            TimerPurpose::ActiveClientsCheck => self.on_active_clients_check(now),
            TimerPurpose::AsleepClientsCheck => self.on_asleep_clients_check(now),
            TimerPurpose::AwakenSubscriberCheck => self.on_awaken_subscriber_check(now),
            TimerPurpose::PendingRetainCheck => self.on_pending_retain_check(now),
            TimerPurpose::RequestsCheck => self.on_requests_check(now),
            TimerPurpose::RegistrationsCheck => self.on_registrations_check(now),
            TimerPurpose::MessagesClear => self.on_messages_clear(),
        }
    }

    fn on_lifecycle_transition(&mut self) -> (Vec<Outbound>, Vec<TimerRequest>, Vec<TimerHandle>) {
        let new_state = self.lifecycle_transition();
        let timers = self.config.timers.clone();
        let requests = match new_state {
            GatewayState::Online => vec![
                TimerRequest { purpose: TimerPurpose::LifecycleTransition, after: timers.online_state_interval },
                TimerRequest { purpose: TimerPurpose::Advertise, after: timers.advertise_interval },
                TimerRequest { purpose: TimerPurpose::ActiveClientsCheck, after: timers.active_clients_check_interval },
                TimerRequest { purpose: TimerPurpose::AsleepClientsCheck, after: timers.asleep_clients_check_interval },
                TimerRequest { purpose: TimerPurpose::AwakenSubscriberCheck, after: timers.awaken_subscriber_check_interval },
                TimerRequest { purpose: TimerPurpose::PendingRetainCheck, after: timers.pending_retain_check_interval },
                TimerRequest { purpose: TimerPurpose::RequestsCheck, after: timers.requests_check_interval },
                TimerRequest { purpose: TimerPurpose::RegistrationsCheck, after: timers.registrations_check_interval },
                TimerRequest { purpose: TimerPurpose::MessagesClear, after: timers.messages_clear_interval },
            ],
            GatewayState::Offline => {
                vec![TimerRequest { purpose: TimerPurpose::LifecycleTransition, after: timers.offline_state_interval }]
            }
        };
        let outbound = if new_state == GatewayState::Online {
            vec![self.advertise()]
        } else {
            Vec::new()
        };
        (outbound, requests, Vec::new())
    }

    fn on_advertise(&mut self) -> (Vec<Outbound>, Vec<TimerRequest>, Vec<TimerHandle>) {
        if self.state != GatewayState::Online {
            return (Vec::new(), Vec::new(), Vec::new());
        }
        let next = vec![TimerRequest {
            purpose: TimerPurpose::Advertise,
            after: self.config.timers.advertise_interval,
        }];
        (vec![self.advertise()], next, Vec::new())
    }

    fn on_active_clients_check(&mut self, now: Instant) -> (Vec<Outbound>, Vec<TimerRequest>, Vec<TimerHandle>) {
        if self.state != GatewayState::Online {
            return (Vec::new(), Vec::new(), Vec::new());
        }
        let out = self.sweep_active_clients(now);
        let next = vec![TimerRequest {
            purpose: TimerPurpose::ActiveClientsCheck,
            after: self.config.timers.active_clients_check_interval,
        }];
        (out, next, Vec::new())
    }

    fn on_asleep_clients_check(&mut self, now: Instant) -> (Vec<Outbound>, Vec<TimerRequest>, Vec<TimerHandle>) {
        if self.state != GatewayState::Online {
            return (Vec::new(), Vec::new(), Vec::new());
        }
        self.sweep_asleep_clients(now);
        let next = vec![TimerRequest {
            purpose: TimerPurpose::AsleepClientsCheck,
            after: self.config.timers.asleep_clients_check_interval,
        }];
        (Vec::new(), next, Vec::new())
    }

    fn on_awaken_subscriber_check(&mut self, now: Instant) -> (Vec<Outbound>, Vec<TimerRequest>, Vec<TimerHandle>) {
        if self.state != GatewayState::Online {
            return (Vec::new(), Vec::new(), Vec::new());
        }
        let out = self.sweep_awaken(now);
        let next = vec![TimerRequest {
            purpose: TimerPurpose::AwakenSubscriberCheck,
            after: self.config.timers.awaken_subscriber_check_interval,
        }];
        (out, next, Vec::new())
    }

    fn on_pending_retain_check(&mut self, now: Instant) -> (Vec<Outbound>, Vec<TimerRequest>, Vec<TimerHandle>) {
        if self.state != GatewayState::Online {
            return (Vec::new(), Vec::new(), Vec::new());
        }
        let out = self.sweep_pending_retain(now);
        let next = vec![TimerRequest {
            purpose: TimerPurpose::PendingRetainCheck,
            after: self.config.timers.pending_retain_check_interval,
        }];
        (out, next, Vec::new())
    }

    fn on_requests_check(&mut self, now: Instant) -> (Vec<Outbound>, Vec<TimerRequest>, Vec<TimerHandle>) {
        if self.state != GatewayState::Online {
            return (Vec::new(), Vec::new(), Vec::new());
        }
        let out = self.sweep_requests(now);
        let next = vec![TimerRequest {
            purpose: TimerPurpose::RequestsCheck,
            after: self.config.timers.requests_check_interval,
        }];
        (out, next, Vec::new())
    }

    fn on_registrations_check(&mut self, now: Instant) -> (Vec<Outbound>, Vec<TimerRequest>, Vec<TimerHandle>) {
        if self.state != GatewayState::Online {
            return (Vec::new(), Vec::new(), Vec::new());
        }
        let out = self.sweep_registrations(now);
        let next = vec![TimerRequest {
            purpose: TimerPurpose::RegistrationsCheck,
            after: self.config.timers.registrations_check_interval,
        }];
        (out, next, Vec::new())
    }

    fn on_messages_clear(&mut self) -> (Vec<Outbound>, Vec<TimerRequest>, Vec<TimerHandle>) {
        self.sweep_messages();
        let next = vec![TimerRequest {
            purpose: TimerPurpose::MessagesClear,
            after: self.config.timers.messages_clear_interval,
        }];
        (Vec::new(), next, Vec::new())
    }
}
