//! termweb - renders live web pages into a terminal character grid
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐  ws   ┌────────────────┐  ws   ┌──────────────────────┐
//! │  Terminal  │ ←───→ │      Hub       │ ←───→ │ Tab renderer (1/tab) │
//! └────────────┘       │ tabs, sizing,  │       │ dims → captures →    │
//!                      │ raw text jobs  │       │ text grid → frames   │
//!                      └────────────────┘       └──────────────────────┘
//!                              ↕ ws                        ↕
//!                      ┌────────────────┐       ┌──────────────────────┐
//!                      │ Browser driver │       │  DomHost (the page)  │
//!                      └────────────────┘       └──────────────────────┘
//! ```

pub mod config;
pub mod constants;
pub mod dom;
pub mod host;
pub mod hub;
pub mod utils;
