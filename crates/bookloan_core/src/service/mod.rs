//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository primitives into lending use-cases.
//! - Keep CLI/HTTP boundary layers decoupled from storage details.

pub mod loan_service;
