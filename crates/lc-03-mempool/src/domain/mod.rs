//! Mempool domain: entries, errors, the pool and its priority model.

pub mod entities;
pub mod errors;
pub mod pool;
