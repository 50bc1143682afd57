//! The per-worker flow table (spec.md §4.3 component E): a bounded map of
//! canonical keys to `Connection` records, a bounded-capacity admission
//! policy, and the periodic expiry sweep.
//!
//! The original keeps flows in an intrusive per-bucket list backed by a
//! handle-indexed pool (spec.md §9 design notes); a `HashMap<FlowKey,
//! Connection>` gets the same externally observable behaviour (bounded
//! size, O(1) average lookup/insert) without hand-rolled intrusive pointers,
//! which is the more idiomatic choice in Rust.

use std::collections::HashMap;

use netmon_events::base::{BaseEvent, TcpBeginEvent, TcpDataEvent, TcpEndEvent};
use netmon_events::Event;

use crate::parser::{PacketCtx, TcpSegmentInfo, TCP_ACK, TCP_SYN};
use crate::tcp::connection::{ConnState, Connection, Endpoint, FlowKey};

pub struct ConnectionTracker {
    flows: HashMap<FlowKey, Connection>,
    max_connections: usize,
    connection_timeout_us: u64,
    time_wait_us: u64,
    refused_syns: u64,
}

impl ConnectionTracker {
    pub fn new(max_connections: usize, connection_timeout_us: u64, time_wait_us: u64) -> Self {
        Self {
            flows: HashMap::new(),
            max_connections,
            connection_timeout_us,
            time_wait_us,
            refused_syns: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    /// Count of bare SYNs silently dropped because the table was at
    /// `max_connections` (spec.md §4.3 "Capacity policy"), reported in the
    /// shutdown statistics summary.
    pub fn refused_syns(&self) -> u64 {
        self.refused_syns
    }

    /// Feeds one observed TCP segment through the tracker, invoking `emit`
    /// for every event the segment produces. `packet_len` is the full L3
    /// packet size (folded into `sent[dir]` on every accepted transition,
    /// spec.md §4.3); `payload_len` is the L4 payload size, reported on
    /// `tcp_data` and used to decide whether one is emitted at all.
    pub fn on_segment(
        &mut self,
        ctx: PacketCtx,
        tcp: TcpSegmentInfo,
        packet_len: u16,
        payload_len: usize,
        now: u64,
        mut emit: impl FnMut(Event),
    ) {
        let (key, dir) = FlowKey::canonicalize(ctx.saddr, tcp.sport, ctx.daddr, tcp.dport);

        if let Some(conn) = self.flows.get_mut(&key) {
            let effect = conn.on_segment(dir, tcp.flags, packet_len, now);
            if effect.accepted && payload_len > 0 {
                emit(Event::TcpData(TcpDataEvent {
                    base: BaseEvent {
                        timestamp: now,
                        saddr: side_addr(&key, dir),
                        daddr: side_addr(&key, dir.opposite()),
                    },
                    sport: side_port(&key, dir),
                    dport: side_port(&key, dir.opposite()),
                    creation: conn.creation,
                    payload: payload_len.min(u16::MAX as usize) as u16,
                }));
            }
            return;
        }

        // No existing flow: only a bare SYN opens one, and only if there is
        // room in the table (spec.md §4.3 "Capacity policy").
        let is_pure_syn = tcp.flags & TCP_SYN != 0 && tcp.flags & TCP_ACK == 0;
        if !is_pure_syn {
            return;
        }
        if self.flows.len() >= self.max_connections {
            self.refused_syns += 1;
            log::warn!("connection table at capacity ({}), dropping SYN", self.max_connections);
            return;
        }

        let conn = Connection::new(key, dir, packet_len, now);
        emit(Event::TcpBegin(TcpBeginEvent {
            base: BaseEvent {
                timestamp: now,
                saddr: side_addr(&key, dir),
                daddr: side_addr(&key, dir.opposite()),
            },
            sport: side_port(&key, dir),
            dport: side_port(&key, dir.opposite()),
        }));
        self.flows.insert(key, conn);
    }

    /// Removes flows that have aged out, emitting a terminal `tcp_end` for
    /// each (spec.md §4.3 "Expiry sweep").
    pub fn sweep(&mut self, now: u64, mut emit: impl FnMut(Event)) {
        let expired: Vec<FlowKey> = self
            .flows
            .iter()
            .filter(|(_, conn)| self.is_expired(conn, now))
            .map(|(key, _)| *key)
            .collect();

        for key in expired {
            if let Some(conn) = self.flows.remove(&key) {
                let ts = conn.terminal_timestamp(now);
                emit(Event::TcpEnd(TcpEndEvent {
                    base: BaseEvent {
                        timestamp: ts,
                        saddr: side_addr(&key, conn.active_opener),
                        daddr: side_addr(&key, conn.active_opener.opposite()),
                    },
                    sport: side_port(&key, conn.active_opener),
                    dport: side_port(&key, conn.active_opener.opposite()),
                    creation: conn.creation,
                    transferred_client: conn.client_bytes(),
                    transferred_server: conn.server_bytes(),
                }));
            }
        }
    }

    fn is_expired(&self, conn: &Connection, now: u64) -> bool {
        let idle = now.saturating_sub(conn.last_packet);
        if idle > self.connection_timeout_us {
            return true;
        }
        conn.state == ConnState::Closed && idle > self.time_wait_us
    }
}

fn side_addr(key: &FlowKey, side: Endpoint) -> netmon_events::Address {
    match side {
        Endpoint::Addr1 => key.addr1,
        Endpoint::Addr2 => key.addr2,
    }
}

fn side_port(key: &FlowKey, side: Endpoint) -> u16 {
    match side {
        Endpoint::Addr1 => key.port1,
        Endpoint::Addr2 => key.port2,
    }
}
