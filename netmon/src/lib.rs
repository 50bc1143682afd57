//! Library half of the `netmon` package: everything the four binaries share
//! (packet parsing, the TCP tracker, the DNS parser and inverted cache, the
//! capture abstraction, configuration) lives here so `netmon-read` and
//! `netmon-sort` can reuse the DNS cache and config types without linking a
//! second copy of the parser.

pub mod capture;
pub mod config;
pub mod dns;
pub mod error;
pub mod parser;
pub mod stats;
pub mod tcp;
pub mod worker;
