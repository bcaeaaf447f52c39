//! Consensus domain: committee management, BFT messages, the round state
//! machine and fork choice.

pub mod committee;
pub mod fork_choice;
pub mod messages;
pub mod view;
