//! Filter AST and evaluation (spec.md §4.6).

use chrono::NaiveDateTime;

use crate::address::Address;
use crate::base::{Event, EventKind};
use crate::error::FilterError;
use crate::mask::Mask;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ident {
    Date,
    EventType,
    SourceIp,
    SourceHostname,
    SourcePort,
    DestinationIp,
    DestinationHostname,
    DestinationPort,
    Ip,
    Hostname,
    Port,
    IcmpType,
    IcmpCode,
    Transferred,
    QueryType,
    Domain,
    NumberDnsResponses,
    DnsResponse,
    Payload,
    Creation,
    Duration,
    TransferredClient,
    TransferredServer,
}

impl Ident {
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "date" => Ident::Date,
            "event_type" => Ident::EventType,
            "source_ip" => Ident::SourceIp,
            "source_hostname" => Ident::SourceHostname,
            "source_port" => Ident::SourcePort,
            "destination_ip" => Ident::DestinationIp,
            "destination_hostname" => Ident::DestinationHostname,
            "destination_port" => Ident::DestinationPort,
            "ip" => Ident::Ip,
            "hostname" => Ident::Hostname,
            "port" => Ident::Port,
            "icmp_type" => Ident::IcmpType,
            "icmp_code" => Ident::IcmpCode,
            "transferred" => Ident::Transferred,
            "query_type" => Ident::QueryType,
            "domain" => Ident::Domain,
            "number_dns_responses" => Ident::NumberDnsResponses,
            "dns_response" => Ident::DnsResponse,
            "payload" => Ident::Payload,
            "creation" => Ident::Creation,
            "duration" => Ident::Duration,
            "transferred_client" => Ident::TransferredClient,
            "transferred_server" => Ident::TransferredServer,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Ident::Date => "date",
            Ident::EventType => "event_type",
            Ident::SourceIp => "source_ip",
            Ident::SourceHostname => "source_hostname",
            Ident::SourcePort => "source_port",
            Ident::DestinationIp => "destination_ip",
            Ident::DestinationHostname => "destination_hostname",
            Ident::DestinationPort => "destination_port",
            Ident::Ip => "ip",
            Ident::Hostname => "hostname",
            Ident::Port => "port",
            Ident::IcmpType => "icmp_type",
            Ident::IcmpCode => "icmp_code",
            Ident::Transferred => "transferred",
            Ident::QueryType => "query_type",
            Ident::Domain => "domain",
            Ident::NumberDnsResponses => "number_dns_responses",
            Ident::DnsResponse => "dns_response",
            Ident::Payload => "payload",
            Ident::Creation => "creation",
            Ident::Duration => "duration",
            Ident::TransferredClient => "transferred_client",
            Ident::TransferredServer => "transferred_server",
        }
    }

    /// Identifiers that accept ordering comparisons (`<`, `>`, `<=`, `>=`)
    /// in addition to `==`/`!=`. Everything else is equality-only.
    fn supports_ordering(&self) -> bool {
        !matches!(
            self,
            Ident::EventType
                | Ident::SourceIp
                | Ident::DestinationIp
                | Ident::Ip
                | Ident::SourceHostname
                | Ident::DestinationHostname
                | Ident::Hostname
                | Ident::Domain
                | Ident::DnsResponse
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl CmpOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Gt => ">",
            CmpOp::Le => "<=",
            CmpOp::Ge => ">=",
        }
    }

    fn apply<T: PartialOrd>(&self, lhs: T, rhs: T) -> bool {
        match self {
            CmpOp::Eq => lhs == rhs,
            CmpOp::Ne => lhs != rhs,
            CmpOp::Lt => lhs < rhs,
            CmpOp::Gt => lhs > rhs,
            CmpOp::Le => lhs <= rhs,
            CmpOp::Ge => lhs >= rhs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTypeLit {
    Icmp,
    Udp,
    Dns,
    TcpBegin,
    TcpData,
    TcpEnd,
}

impl EventTypeLit {
    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "icmp" => EventTypeLit::Icmp,
            "udp" => EventTypeLit::Udp,
            "dns" => EventTypeLit::Dns,
            "tcp_begin" => EventTypeLit::TcpBegin,
            "tcp_data" => EventTypeLit::TcpData,
            "tcp_end" => EventTypeLit::TcpEnd,
            _ => return None,
        })
    }

    fn matches(&self, kind: EventKind) -> bool {
        matches!(
            (self, kind),
            (EventTypeLit::Icmp, EventKind::Icmp)
                | (EventTypeLit::Udp, EventKind::Udp)
                | (EventTypeLit::Dns, EventKind::Dns)
                | (EventTypeLit::TcpBegin, EventKind::TcpBegin)
                | (EventTypeLit::TcpData, EventKind::TcpData)
                | (EventTypeLit::TcpEnd, EventKind::TcpEnd)
        )
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    Str(String),
    EventType(EventTypeLit),
    /// Microseconds since the Unix epoch.
    Timestamp(u64),
    Cidr(Mask),
}

impl Value {
    /// Builds the right `Value` variant for `ident` out of a raw lexeme:
    /// `raw` is either a bareword (`Word`) or a quoted string (`quoted`
    /// is `true` in that case).
    pub fn for_ident(ident: Ident, raw: &str, quoted: bool) -> Result<Self, FilterError> {
        match ident {
            Ident::EventType => EventTypeLit::parse(raw)
                .map(Value::EventType)
                .ok_or_else(|| FilterError::InvalidValue {
                    ident: ident.name().to_string(),
                    reason: format!("'{raw}' is not a known event type"),
                }),
            Ident::Ip | Ident::SourceIp | Ident::DestinationIp | Ident::DnsResponse => {
                Mask::parse(raw).map(Value::Cidr)
            }
            Ident::Date => {
                if !quoted {
                    return Err(FilterError::InvalidValue {
                        ident: ident.name().to_string(),
                        reason: "timestamps must be quoted, e.g. \"2024/01/02 03:04:05\""
                            .to_string(),
                    });
                }
                parse_timestamp(raw)
                    .map(Value::Timestamp)
                    .ok_or_else(|| FilterError::InvalidValue {
                        ident: ident.name().to_string(),
                        reason: format!("'{raw}' is not a valid timestamp"),
                    })
            }
            Ident::Hostname
            | Ident::SourceHostname
            | Ident::DestinationHostname
            | Ident::Domain => Ok(Value::Str(raw.to_string())),
            _ => raw
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| FilterError::InvalidValue {
                    ident: ident.name().to_string(),
                    reason: format!("'{raw}' is not an integer"),
                }),
        }
    }
}

fn parse_timestamp(s: &str) -> Option<u64> {
    let parsed = NaiveDateTime::parse_from_str(s, "%Y/%m/%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y/%m/%d %H:%M:%S"))
        .ok()?;
    let micros = parsed.and_utc().timestamp_micros();
    u64::try_from(micros).ok()
}

#[derive(Debug, Clone)]
pub enum Expr {
    Compare {
        ident: Ident,
        op: CmpOp,
        value: Value,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn validate(ident: Ident, op: CmpOp) -> Result<(), FilterError> {
        if !ident.supports_ordering() && !matches!(op, CmpOp::Eq | CmpOp::Ne) {
            return Err(FilterError::InvalidComparison {
                ident: ident.name().to_string(),
                op: op.symbol().to_string(),
            });
        }
        Ok(())
    }

    pub fn eval(
        &self,
        event: &Event,
        resolve_hostname: &dyn Fn(&Address) -> Option<String>,
    ) -> bool {
        match self {
            Expr::And(a, b) => a.eval(event, resolve_hostname) && b.eval(event, resolve_hostname),
            Expr::Or(a, b) => a.eval(event, resolve_hostname) || b.eval(event, resolve_hostname),
            Expr::Compare { ident, op, value } => eval_compare(*ident, *op, value, event, resolve_hostname),
        }
    }
}

fn eval_compare(
    ident: Ident,
    op: CmpOp,
    value: &Value,
    event: &Event,
    resolve_hostname: &dyn Fn(&Address) -> Option<String>,
) -> bool {
    let base = event.base();

    match ident {
        Ident::Date => match value {
            Value::Timestamp(ts) => op.apply(event.timestamp(), *ts),
            _ => false,
        },
        Ident::EventType => match value {
            Value::EventType(lit) => match op {
                CmpOp::Eq => lit.matches(event.kind()),
                CmpOp::Ne => !lit.matches(event.kind()),
                _ => false,
            },
            _ => false,
        },
        Ident::SourceIp => match value {
            Value::Cidr(m) => xor_ne(op, m.matches(&base.saddr)),
            _ => false,
        },
        Ident::DestinationIp => match value {
            Value::Cidr(m) => xor_ne(op, m.matches(&base.daddr)),
            _ => false,
        },
        Ident::Ip => match value {
            Value::Cidr(m) => xor_ne(op, m.matches(&base.saddr) || m.matches(&base.daddr)),
            _ => false,
        },
        Ident::SourceHostname => match value {
            Value::Str(needle) => xor_ne(op, hostname_contains(resolve_hostname(&base.saddr), needle)),
            _ => false,
        },
        Ident::DestinationHostname => match value {
            Value::Str(needle) => xor_ne(op, hostname_contains(resolve_hostname(&base.daddr), needle)),
            _ => false,
        },
        Ident::Hostname => match value {
            Value::Str(needle) => xor_ne(
                op,
                hostname_contains(resolve_hostname(&base.saddr), needle)
                    || hostname_contains(resolve_hostname(&base.daddr), needle),
            ),
            _ => false,
        },
        Ident::SourcePort => compare_port(event, op, value, Endpoint::Source),
        Ident::DestinationPort => compare_port(event, op, value, Endpoint::Destination),
        Ident::Port => {
            compare_port(event, op, value, Endpoint::Source)
                || compare_port(event, op, value, Endpoint::Destination)
        }
        Ident::IcmpType => match (event, value) {
            (Event::Icmp(e), Value::Int(v)) => op.apply(e.icmp_type as i64, *v),
            _ => false,
        },
        Ident::IcmpCode => match (event, value) {
            (Event::Icmp(e), Value::Int(v)) => op.apply(e.icmp_code as i64, *v),
            _ => false,
        },
        Ident::Transferred => match (event, value) {
            (Event::Icmp(e), Value::Int(v)) => op.apply(e.transferred as i64, *v),
            (Event::Udp(e), Value::Int(v)) => op.apply(e.transferred as i64, *v),
            (Event::Dns(e), Value::Int(v)) => op.apply(e.transferred as i64, *v),
            _ => false,
        },
        Ident::QueryType => match (event, value) {
            (Event::Dns(e), Value::Int(v)) => op.apply(e.qtype as i64, *v),
            _ => false,
        },
        Ident::Domain => match (event, value) {
            (Event::Dns(e), Value::Str(needle)) => {
                xor_ne(op, e.domain.to_lowercase().contains(&needle.to_lowercase()))
            }
            _ => false,
        },
        Ident::NumberDnsResponses => match (event, value) {
            (Event::Dns(e), Value::Int(v)) => op.apply(e.responses.len() as i64, *v),
            _ => false,
        },
        Ident::DnsResponse => match (event, value) {
            (Event::Dns(e), Value::Cidr(m)) => {
                xor_ne(op, e.responses.iter().any(|a| m.matches(a)))
            }
            _ => false,
        },
        Ident::Payload => match (event, value) {
            (Event::TcpData(e), Value::Int(v)) => op.apply(e.payload as i64, *v),
            _ => false,
        },
        Ident::Creation => match (event, value) {
            (Event::TcpData(e), Value::Int(v)) => op.apply(e.creation as i64, *v),
            (Event::TcpEnd(e), Value::Int(v)) => op.apply(e.creation as i64, *v),
            _ => false,
        },
        Ident::Duration => match (event, value) {
            (Event::TcpEnd(e), Value::Int(seconds)) => {
                let duration_us = event.timestamp().saturating_sub(e.creation);
                op.apply(duration_us as i64, seconds.saturating_mul(1_000_000))
            }
            _ => false,
        },
        Ident::TransferredClient => match (event, value) {
            (Event::TcpEnd(e), Value::Int(v)) => op.apply(e.transferred_client as i64, *v),
            _ => false,
        },
        Ident::TransferredServer => match (event, value) {
            (Event::TcpEnd(e), Value::Int(v)) => op.apply(e.transferred_server as i64, *v),
            _ => false,
        },
    }
}

enum Endpoint {
    Source,
    Destination,
}

fn compare_port(event: &Event, op: CmpOp, value: &Value, endpoint: Endpoint) -> bool {
    let port = match (event, &endpoint) {
        (Event::Udp(e), Endpoint::Source) => Some(e.sport),
        (Event::Udp(e), Endpoint::Destination) => Some(e.dport),
        (Event::Dns(e), Endpoint::Source) => Some(e.sport),
        (Event::Dns(e), Endpoint::Destination) => Some(e.dport),
        (Event::TcpBegin(e), Endpoint::Source) => Some(e.sport),
        (Event::TcpBegin(e), Endpoint::Destination) => Some(e.dport),
        (Event::TcpData(e), Endpoint::Source) => Some(e.sport),
        (Event::TcpData(e), Endpoint::Destination) => Some(e.dport),
        (Event::TcpEnd(e), Endpoint::Source) => Some(e.sport),
        (Event::TcpEnd(e), Endpoint::Destination) => Some(e.dport),
        (Event::Icmp(_), _) => None,
    };
    match (port, value) {
        (Some(p), Value::Int(v)) => op.apply(p as i64, *v),
        _ => false,
    }
}

fn hostname_contains(resolved: Option<String>, needle: &str) -> bool {
    match resolved {
        Some(h) => h.to_lowercase().contains(&needle.to_lowercase()),
        None => false,
    }
}

/// `==`/`!=` on a boolean predicate (membership, substring match) just
/// negate the flag; any other operator is rejected during `validate`.
fn xor_ne(op: CmpOp, matched: bool) -> bool {
    match op {
        CmpOp::Ne => !matched,
        _ => matched,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{BaseEvent, DnsEvent, IcmpEvent, TcpEndEvent};

    fn icmp() -> Event {
        Event::Icmp(IcmpEvent {
            base: BaseEvent::new(10, Address::V4([10, 0, 0, 1]), Address::V4([10, 0, 0, 2]))
                .unwrap(),
            icmp_type: 8,
            icmp_code: 0,
            transferred: 84,
        })
    }

    fn no_hostnames(_: &Address) -> Option<String> {
        None
    }

    #[test]
    fn event_type_equality() {
        let expr = Expr::Compare {
            ident: Ident::EventType,
            op: CmpOp::Eq,
            value: Value::EventType(EventTypeLit::Icmp),
        };
        assert!(expr.eval(&icmp(), &no_hostnames));
    }

    #[test]
    fn ip_cidr_membership() {
        let expr = Expr::Compare {
            ident: Ident::Ip,
            op: CmpOp::Eq,
            value: Value::Cidr(Mask::parse("10.0.0.0/24").unwrap()),
        };
        assert!(expr.eval(&icmp(), &no_hostnames));
    }

    #[test]
    fn and_or_short_circuit_correctly() {
        let t = Expr::Compare {
            ident: Ident::EventType,
            op: CmpOp::Eq,
            value: Value::EventType(EventTypeLit::Icmp),
        };
        let f = Expr::Compare {
            ident: Ident::EventType,
            op: CmpOp::Eq,
            value: Value::EventType(EventTypeLit::Udp),
        };
        assert!(Expr::Or(Box::new(t.clone()), Box::new(f.clone())).eval(&icmp(), &no_hostnames));
        assert!(!Expr::And(Box::new(t), Box::new(f)).eval(&icmp(), &no_hostnames));
    }

    #[test]
    fn ordering_rejected_for_equality_only_identifier() {
        assert!(Expr::validate(Ident::EventType, CmpOp::Lt).is_err());
        assert!(Expr::validate(Ident::Port, CmpOp::Lt).is_ok());
    }

    #[test]
    fn duration_compares_in_seconds_against_microsecond_span() {
        let event = Event::TcpEnd(TcpEndEvent {
            base: BaseEvent::new(5_000_000, Address::V4([1, 1, 1, 1]), Address::V4([2, 2, 2, 2]))
                .unwrap(),
            sport: 1,
            dport: 2,
            creation: 1_000_000,
            transferred_client: 0,
            transferred_server: 0,
        });
        let expr = Expr::Compare {
            ident: Ident::Duration,
            op: CmpOp::Eq,
            value: Value::Int(4),
        };
        assert!(expr.eval(&event, &no_hostnames));
    }

    #[test]
    fn dns_response_membership() {
        let event = Event::Dns(DnsEvent {
            base: BaseEvent::new(1, Address::V4([1, 1, 1, 1]), Address::V4([8, 8, 8, 8])).unwrap(),
            sport: 1,
            dport: 53,
            transferred: 1,
            qtype: 1,
            domain: "example.com".to_string(),
            responses: vec![Address::V4([93, 184, 216, 34])],
        });
        let expr = Expr::Compare {
            ident: Ident::DnsResponse,
            op: CmpOp::Eq,
            value: Value::Cidr(Mask::parse("93.184.216.34").unwrap()),
        };
        assert!(expr.eval(&event, &no_hostnames));
    }
}
