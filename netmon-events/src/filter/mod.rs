//! Filter expression grammar: parse a query string once, then evaluate it
//! against many events (spec.md §4.6).

pub mod expr;
mod lexer;
mod parser;

use crate::address::Address;
use crate::base::Event;
use crate::error::FilterError;

pub use expr::Expr;

/// A parsed filter, ready to be evaluated against a stream of events.
/// Hostname-based identifiers (`hostname`, `source_hostname`,
/// `destination_hostname`) need a resolver supplied at evaluation time,
/// since hostnames only live in the replay-side DNS cache, not in the event
/// itself.
pub struct Filter {
    expr: Expr,
}

impl Filter {
    pub fn parse(query: &str) -> Result<Self, FilterError> {
        Ok(Self {
            expr: parser::parse(query)?,
        })
    }

    pub fn matches(&self, event: &Event, resolve_hostname: &dyn Fn(&Address) -> Option<String>) -> bool {
        self.expr.eval(event, resolve_hostname)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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
    fn end_to_end_filter() {
        let filter = Filter::parse("event_type == icmp && ip == 10.0.0.0/24").unwrap();
        assert!(filter.matches(&icmp(), &|_| None));
    }
}
