//! Event model, wire codec, file format and filter grammar shared by the
//! monitor and its offline tools. Kept free of capture/parsing concerns so
//! it can be depended on by anything that only needs to read or write event
//! files.

pub mod address;
pub mod base;
pub mod codec;
pub mod display;
pub mod error;
pub mod file;
pub mod filter;
pub mod mask;
pub mod merger;
pub mod reader;
pub mod writer;

pub use address::Address;
pub use base::{Event, EventKind};
pub use error::{CodecError, FileError, FilterError};
pub use file::Header;
pub use filter::Filter;
pub use reader::EventReader;
pub use writer::EventWriter;
