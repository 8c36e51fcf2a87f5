//! Integration tests for Lex-Harvest
//!
//! These drive the recovery orchestrator and the crawler against scripted
//! in-memory pages. The tokio clock is paused, so minute-scale cooldowns
//! and second-scale widget waits complete instantly.

mod common;
mod crawl_tests;
mod ledger_tests;
mod recovery_tests;
