//! Human-readable and JSON event printing, shared by `netmon-read` and the
//! live monitor's console output.

use std::fmt;

use crate::base::Event;

/// Accumulates `key=value` fields and joins them with a single delimiter,
/// skipping fields a caller chose not to emit instead of printing an empty
/// placeholder for each one.
pub struct DelimWriter {
    delim: char,
    fields: Vec<String>,
}

impl DelimWriter {
    pub fn new(delim: char) -> Self {
        Self {
            delim,
            fields: Vec::new(),
        }
    }

    pub fn field(&mut self, name: &str, value: impl fmt::Display) -> &mut Self {
        self.fields.push(format!("{name}={value}"));
        self
    }

    pub fn field_opt(&mut self, name: &str, value: Option<impl fmt::Display>) -> &mut Self {
        if let Some(v) = value {
            self.field(name, v);
        }
        self
    }

    pub fn finish(self) -> String {
        self.fields.join(&self.delim.to_string())
    }
}

/// Implemented by every event variant so printers can stay generic over
/// `Event` without re-deriving field lists at each call site.
pub trait EventFmt {
    fn format_text(&self, delim: char) -> String;
}

impl EventFmt for Event {
    fn format_text(&self, delim: char) -> String {
        let mut w = DelimWriter::new(delim);
        w.field("time", self.timestamp())
            .field("type", self.kind().name())
            .field("src", self.base().saddr)
            .field("dst", self.base().daddr);

        match self {
            Event::Icmp(e) => {
                w.field("icmp_type", e.icmp_type)
                    .field("icmp_code", e.icmp_code)
                    .field("transferred", e.transferred);
            }
            Event::Udp(e) => {
                w.field("sport", e.sport)
                    .field("dport", e.dport)
                    .field("transferred", e.transferred);
            }
            Event::Dns(e) => {
                w.field("sport", e.sport)
                    .field("dport", e.dport)
                    .field("transferred", e.transferred)
                    .field("qtype", e.qtype)
                    .field("domain", &e.domain)
                    .field(
                        "responses",
                        e.responses
                            .iter()
                            .map(|a| a.to_string())
                            .collect::<Vec<_>>()
                            .join(","),
                    );
            }
            Event::TcpBegin(e) => {
                w.field("sport", e.sport).field("dport", e.dport);
            }
            Event::TcpData(e) => {
                w.field("sport", e.sport)
                    .field("dport", e.dport)
                    .field("creation", e.creation)
                    .field("payload", e.payload);
            }
            Event::TcpEnd(e) => {
                w.field("sport", e.sport)
                    .field("dport", e.dport)
                    .field("creation", e.creation)
                    .field("transferred_client", e.transferred_client)
                    .field("transferred_server", e.transferred_server)
                    .field(
                        "duration_us",
                        self.timestamp().saturating_sub(e.creation),
                    );
            }
        }

        w.finish()
    }
}

pub fn format_json(event: &Event) -> Result<String, serde_json::Error> {
    serde_json::to_string(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use crate::base::{BaseEvent, IcmpEvent};

    fn icmp() -> Event {
        Event::Icmp(IcmpEvent {
            base: BaseEvent::new(10, Address::V4([10, 0, 0, 1]), Address::V4([10, 0, 0, 2]))
                .unwrap(),
            icmp_type: 8,
            icmp_code: 0,
            transferred: 84,
        })
    }

    #[test]
    fn text_contains_every_field() {
        let text = icmp().format_text('|');
        assert!(text.contains("type=icmp"));
        assert!(text.contains("icmp_type=8"));
        assert!(text.contains("src=10.0.0.1"));
        assert!(text.contains('|'));
    }

    #[test]
    fn json_round_trips_through_serde_value() {
        let json = format_json(&icmp()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "Icmp");
    }
}
