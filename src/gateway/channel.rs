//! Async driving loop: owns the `Clock`/`TimerService`/`Transport`
//! collaborators and feeds their events into the synchronous `GatewayCore`.
//!
//! Split out from `GatewayCore` itself so the core stays trivially testable
//! against `ManualClock`/`ManualTimerService` without any `tokio::select!`
//! or trait-object plumbing — see `examples/vibesrc-vibemq/src/broker/mod.rs`'s
//! `run` function, which draws the same line between its connection-accept
//! loop and the broker state it drives.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::clock::{Clock, TimerHandle, TimerService};
use crate::codec;
use crate::transport::Transport;

use super::{GatewayCore, Outbound, TimerPurpose, TimerRequest};

/// Drive `core` to completion (forever, absent a fatal transport error).
pub async fn run<C, S, X>(mut core: GatewayCore, clock: C, timers: S, transport: X)
where
    C: Clock,
    S: TimerService,
    X: Transport,
{
    let mut scheduled: HashMap<TimerHandle, TimerPurpose> = HashMap::new();
    arm(&timers, &mut scheduled, core.start(clock.now()));

    loop {
        let broadcast_addr = core.config.server.broadcast_address;
        tokio::select! {
            recv = transport.recv() => {
                match recv {
                    Ok((datagram, addr)) => {
                        match codec::decode(&datagram) {
                            Ok(packet) => {
                                let outbound = core.handle_packet(clock.now(), addr, packet);
                                send_all(&transport, outbound, broadcast_addr).await;
                            }
                            Err(e) => debug!(%addr, error = %e, "dropping undecodable datagram"),
                        }
                    }
                    Err(e) => warn!(error = %e, "transport receive failed"),
                }
            }
            _ = timers.notified() => {
                for handle in timers.drain_fired() {
                    let Some(purpose) = scheduled.remove(&handle) else {
                        continue;
                    };
                    let (outbound, requests, cancellations) = core.handle_timer(clock.now(), purpose);
                    for cancel in cancellations {
                        timers.cancel(cancel);
                        scheduled.remove(&cancel);
                    }
                    arm(&timers, &mut scheduled, requests);
                    send_all(&transport, outbound, broadcast_addr).await;
                }
            }
        }
    }
}

fn arm<S: TimerService>(
    timers: &S,
    scheduled: &mut HashMap<TimerHandle, TimerPurpose>,
    requests: Vec<TimerRequest>,
) {
    for request in requests {
        let handle = timers.schedule_after(request.after);
        scheduled.insert(handle, request.purpose);
    }
}

async fn send_all<X: Transport>(transport: &X, outbound: Vec<Outbound>, broadcast_addr: codec::Addr) {
    for item in outbound {
        match item {
            Outbound::Unicast(addr, packet) => match codec::encode(&packet) {
                Ok(bytes) => transport.send_to(bytes, addr).await,
                Err(e) => warn!(%addr, error = %e, "dropping unencodable outbound packet"),
            },
            Outbound::Broadcast(packet) => match codec::encode(&packet) {
                Ok(bytes) => transport.broadcast(bytes, broadcast_addr).await,
                Err(e) => warn!(error = %e, "dropping unencodable broadcast packet"),
            },
        }
    }
}
