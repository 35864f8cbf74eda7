//! Turnstile - Per-Client Sliding-Window Rate Limiting
//!
//! This crate implements an in-process rate limiter that admits at most a
//! fixed number of requests per client key within a rolling time window.
//! It ships an axum middleware for embedding the limiter in a request
//! pipeline and a small HTTP service exposing the same decisions.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
