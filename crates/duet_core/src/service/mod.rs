//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into lifecycle-level APIs.
//! - Keep transport layers decoupled from storage details.

pub mod notify;
pub mod reminder;
pub mod session_service;
pub mod space_service;
pub mod sweep;
