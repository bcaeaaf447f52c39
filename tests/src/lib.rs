//! # LogiChain Test Suite
//!
//! Unified test crate:
//!
//! ```text
//! tests/src/
//! ├── harness.rs        # Chain fixtures and block builders
//! ├── integration/      # End-to-end scenarios
//! │   ├── genesis_flow.rs
//! │   ├── double_spend.rs
//! │   ├── pod_flow.rs
//! │   ├── offline_reconciliation.rs
//! │   └── view_change.rs
//! └── properties.rs     # Chain-level invariants over generated chains
//! ```
//!
//! ```bash
//! cargo test -p lc-tests
//! cargo test -p lc-tests integration::
//! cargo test -p lc-tests properties::
//! ```

#![allow(dead_code)]

pub mod harness;
pub mod integration;
pub mod properties;
