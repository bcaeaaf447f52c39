//! Production adapters behind the subsystem ports.

pub mod rocks;

pub use rocks::RocksKv;
