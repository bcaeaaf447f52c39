//! End-to-end scenarios over the assembled core.

pub mod double_spend;
pub mod genesis_flow;
pub mod offline_reconciliation;
pub mod pod_flow;
pub mod view_change;
