//! Types shared between the Kestrel control server and tools that talk to it.

pub mod config;
pub mod protocol;
