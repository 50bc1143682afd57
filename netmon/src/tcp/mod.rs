pub mod connection;
pub mod connections;
pub mod segments;

pub use connection::{ConnState, Connection, Endpoint, FlowKey};
pub use connections::ConnectionTracker;
pub use segments::{Reassembler, SegmentError};
