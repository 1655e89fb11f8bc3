//! Turnstile - Sliding-Window Admission Control
//!
//! This crate implements a sliding-window admission-control (rate limiting)
//! service. It tracks per-subject event history across multiple time
//! windows, makes atomic allow/deny decisions under concurrent access, and
//! bounds its own memory with idle eviction. It can be embedded as an axum
//! middleware or run standalone behind `POST /v1/check`.

pub mod admission;
pub mod config;
pub mod error;
pub mod http;
