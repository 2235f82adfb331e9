//! Core session engine
//!
//! This module contains the turn orchestration and the rolling memory that
//! feeds each request.

pub mod chat;
pub mod memory;

pub use chat::{Preview, Session, TurnError};
