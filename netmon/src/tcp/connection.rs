//! Per-flow state: canonical key, state machine and byte counters
//! (spec.md §3, §4.3).

use netmon_events::Address;

use crate::parser::{TCP_ACK, TCP_FIN, TCP_RST, TCP_SYN};

/// The flow's two endpoints, canonicalised so `port1 <= port2`, tiebreak by
/// lexicographic byte comparison of the two addresses (spec.md §3, §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub addr1: Address,
    pub port1: u16,
    pub addr2: Address,
    pub port2: u16,
}

impl FlowKey {
    /// Builds the canonical key for a segment plus which side (`Addr1` or
    /// `Addr2`) the segment arrived from.
    pub fn canonicalize(saddr: Address, sport: u16, daddr: Address, dport: u16) -> (Self, Endpoint) {
        let src_side = (sport, saddr.as_bytes());
        let dst_side = (dport, daddr.as_bytes());

        if src_side <= dst_side {
            (
                FlowKey {
                    addr1: saddr,
                    port1: sport,
                    addr2: daddr,
                    port2: dport,
                },
                Endpoint::Addr1,
            )
        } else {
            (
                FlowKey {
                    addr1: daddr,
                    port1: dport,
                    addr2: saddr,
                    port2: sport,
                },
                Endpoint::Addr2,
            )
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Addr1,
    Addr2,
}

impl Endpoint {
    pub fn opposite(self) -> Self {
        match self {
            Endpoint::Addr1 => Endpoint::Addr2,
            Endpoint::Addr2 => Endpoint::Addr1,
        }
    }

    fn index(self) -> usize {
        match self {
            Endpoint::Addr1 => 0,
            Endpoint::Addr2 => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    ConnectionRequested,
    ConnectionEstablished,
    DataTransfer,
    Closing,
    Closed,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagClass {
    Syn,
    SynAck,
    Ack,
    Fin,
    Rst,
    Other,
}

fn classify(flags: u8) -> FlagClass {
    if flags & TCP_RST != 0 {
        FlagClass::Rst
    } else if flags & TCP_FIN != 0 {
        FlagClass::Fin
    } else if flags & TCP_SYN != 0 && flags & TCP_ACK != 0 {
        FlagClass::SynAck
    } else if flags & TCP_SYN != 0 {
        FlagClass::Syn
    } else if flags & TCP_ACK != 0 {
        FlagClass::Ack
    } else {
        FlagClass::Other
    }
}

/// What happened to the flow as a result of one observed segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentEffect {
    pub became_established: bool,
    /// True unless the segment tipped the flow into `Failure` (or arrived
    /// while it already was); the tracker emits a `tcp_data` for any
    /// accepted segment that carries a payload, regardless of state.
    pub accepted: bool,
    pub transitioned_to_failure: bool,
}

#[derive(Debug, Clone)]
pub struct Connection {
    pub key: FlowKey,
    pub state: ConnState,
    pub active_opener: Endpoint,
    pub active_closer: Option<Endpoint>,
    pub sent: [u64; 2],
    pub creation: u64,
    pub last_packet: u64,
}

impl Connection {
    /// Opens a flow on its first observed SYN, folding that SYN's own
    /// `packet_len` into `sent[opener]` (spec.md §4.3; mirrors the original
    /// tracker's `init()`, which seeds `sent` with the opening packet's
    /// size rather than leaving it at zero).
    pub fn new(key: FlowKey, opener: Endpoint, packet_len: u16, now: u64) -> Self {
        let mut sent = [0u64; 2];
        sent[opener.index()] = packet_len as u64;
        Self {
            key,
            state: ConnState::ConnectionRequested,
            active_opener: opener,
            active_closer: None,
            sent,
            creation: now,
            last_packet: now,
        }
    }

    /// Applies one observed segment from `dir` carrying `flags` and a full
    /// packet size of `packet_len` bytes at time `now`, running the state
    /// machine of spec.md §4.3's transition table. Every accepted
    /// transition folds `packet_len` into `sent[dir]` (spec.md §4.3 "A
    /// transition updates `sent[dir] += pktsize`").
    pub fn on_segment(&mut self, dir: Endpoint, flags: u8, packet_len: u16, now: u64) -> SegmentEffect {
        if self.state == ConnState::Failure {
            return SegmentEffect {
                became_established: false,
                accepted: false,
                transitioned_to_failure: false,
            };
        }

        let class = classify(flags);
        let is_opener = dir == self.active_opener;
        let mut became_established = false;
        let mut count_bytes = false;
        let mut to_failure = false;

        match (self.state, class, is_opener) {
            (ConnState::ConnectionRequested, FlagClass::Syn, _) => {} // retransmit, ignored
            (ConnState::ConnectionRequested, FlagClass::SynAck, false) => {
                self.state = ConnState::ConnectionEstablished;
                became_established = true;
                count_bytes = true;
            }
            (ConnState::ConnectionRequested, FlagClass::Rst, _) => {
                self.state = ConnState::Closed;
                self.active_closer = Some(dir);
                count_bytes = true;
            }
            (ConnState::ConnectionRequested, _, _) => {}

            (ConnState::ConnectionEstablished, FlagClass::Ack, true) => {
                self.state = ConnState::DataTransfer;
                count_bytes = true;
            }
            (ConnState::ConnectionEstablished, FlagClass::Rst, _) => {
                self.state = ConnState::Closed;
                self.active_closer = Some(dir);
                count_bytes = true;
            }
            (ConnState::ConnectionEstablished, FlagClass::Syn | FlagClass::SynAck, _) => {} // ignore
            (ConnState::ConnectionEstablished, _, _) => {}

            (ConnState::DataTransfer, FlagClass::Syn | FlagClass::SynAck, _) => {
                self.state = ConnState::Failure;
                to_failure = true;
            }
            (ConnState::DataTransfer, FlagClass::Ack | FlagClass::Other, _) => {
                count_bytes = true;
            }
            (ConnState::DataTransfer, FlagClass::Fin, _) => {
                self.state = ConnState::Closing;
                self.active_closer = Some(dir);
                count_bytes = true;
            }
            (ConnState::DataTransfer, FlagClass::Rst, _) => {
                self.state = ConnState::Closed;
                count_bytes = true;
            }

            (ConnState::Closing, FlagClass::Syn | FlagClass::SynAck, _) => {
                self.state = ConnState::Failure;
                to_failure = true;
            }
            (ConnState::Closing, FlagClass::Ack | FlagClass::Other, _) => {
                count_bytes = true;
            }
            (ConnState::Closing, FlagClass::Fin, _) => {
                count_bytes = true;
                if Some(dir) != self.active_closer {
                    self.state = ConnState::Closed;
                }
            }
            (ConnState::Closing, FlagClass::Rst, _) => {
                self.state = ConnState::Closed;
                count_bytes = true;
            }

            (ConnState::Closed, FlagClass::Ack | FlagClass::Other, _) => {
                count_bytes = true;
            }
            (ConnState::Closed, _, _) => {}

            (ConnState::Failure, _, _) => unreachable!("handled above"),
        }

        if count_bytes {
            self.sent[dir.index()] += packet_len as u64;
        }
        self.last_packet = now;

        SegmentEffect {
            became_established,
            accepted: !to_failure,
            transitioned_to_failure: to_failure,
        }
    }

    pub fn client_bytes(&self) -> u64 {
        self.sent[self.active_opener.index()]
    }

    pub fn server_bytes(&self) -> u64 {
        self.sent[self.active_opener.opposite().index()]
    }

    /// `timestamp` field of the terminal `tcp_end` event (spec.md §4.3): the
    /// last observed packet's time once the flow has started winding down,
    /// otherwise the current time (an expiry-sweep removal of a flow still
    /// mid-transfer).
    pub fn terminal_timestamp(&self, now: u64) -> u64 {
        match self.state {
            ConnState::Closing | ConnState::Closed | ConnState::Failure => self.last_packet,
            _ => now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> (FlowKey, Endpoint) {
        FlowKey::canonicalize(
            Address::V4([192, 168, 1, 10]),
            55555,
            Address::V4([10, 0, 0, 1]),
            80,
        )
    }

    #[test]
    fn canonical_key_orders_by_port_then_address() {
        let (k, dir) = key();
        assert_eq!(k.port1, 80);
        assert_eq!(k.port2, 55555);
        assert_eq!(dir, Endpoint::Addr2);
    }

    const HDR: u16 = 40;

    #[test]
    fn full_handshake_data_and_graceful_close() {
        let (k, client_dir) = key();
        let server_dir = client_dir.opposite();
        let mut conn = Connection::new(k, client_dir, HDR, 1000);

        // SYN/ACK from server
        conn.on_segment(server_dir, TCP_SYN | TCP_ACK, HDR, 1001);
        assert_eq!(conn.state, ConnState::ConnectionEstablished);

        // ACK from client
        conn.on_segment(client_dir, TCP_ACK, HDR, 1002);
        assert_eq!(conn.state, ConnState::DataTransfer);

        // client sends 500 bytes
        let eff = conn.on_segment(client_dir, TCP_ACK, HDR + 500, 1003);
        assert!(eff.accepted);

        // server sends 1200 bytes
        conn.on_segment(server_dir, TCP_ACK, HDR + 1200, 1004);

        // client FIN
        conn.on_segment(client_dir, TCP_FIN | TCP_ACK, HDR, 1005);
        assert_eq!(conn.state, ConnState::Closing);

        // server FIN/ACK (not the active closer) -> closed
        conn.on_segment(server_dir, TCP_FIN | TCP_ACK, HDR, 1006);
        assert_eq!(conn.state, ConnState::Closed);

        // client: opening SYN, ACK, data segment, FIN.
        assert_eq!(conn.client_bytes(), 4 * u64::from(HDR) + 500);
        // server: SYN/ACK, data segment, FIN/ACK.
        assert_eq!(conn.server_bytes(), 3 * u64::from(HDR) + 1200);
        assert_eq!(conn.creation, 1000);
        assert_eq!(conn.terminal_timestamp(9999), 1006);
    }

    #[test]
    fn unexpected_syn_during_data_transfer_fails_the_flow() {
        let (k, client_dir) = key();
        let server_dir = client_dir.opposite();
        let mut conn = Connection::new(k, client_dir, HDR, 0);
        conn.on_segment(server_dir, TCP_SYN | TCP_ACK, HDR, 1);
        conn.on_segment(client_dir, TCP_ACK, HDR, 2);

        let eff = conn.on_segment(client_dir, TCP_SYN, HDR, 3);
        assert!(eff.transitioned_to_failure);
        assert_eq!(conn.state, ConnState::Failure);

        // further segments never change a failed flow again.
        let eff2 = conn.on_segment(server_dir, TCP_ACK, HDR + 999, 4);
        assert!(!eff2.accepted);
        assert_eq!(conn.state, ConnState::Failure);
    }

    #[test]
    fn rst_closes_from_any_tracked_state() {
        let (k, client_dir) = key();
        let mut conn = Connection::new(k, client_dir, HDR, 0);
        conn.on_segment(client_dir.opposite(), TCP_RST, HDR, 5);
        assert_eq!(conn.state, ConnState::Closed);
    }
}
