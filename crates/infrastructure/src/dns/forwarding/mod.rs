//! DNS message construction and parsing.
//!
//! Uses `hickory-proto` for the wire format but owns all query/response
//! logic; no stub resolver library is involved.

pub mod message_builder;
pub mod response_parser;

pub use message_builder::MessageBuilder;
pub use response_parser::ResponseParser;
