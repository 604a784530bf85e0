//! Mechanical I/O around the engine: XML instances, JSON/CBOR results,
//! sequence files, DOT dumps.

pub mod dot;
pub mod output;
pub mod xml;
