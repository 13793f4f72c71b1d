//! # Taidao API Server Library
//!
//! This library provides the HTTP side of Taidao: account log-in by email or
//! phone, the Bluesky feed generator endpoints, the chat relay and the CWA
//! weather endpoints.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `clients`: Outbound integrations (mail, Twilio, OpenAI, Bluesky, CWA)
//! - `config`: Configuration management
//! - `error`: Error handling and HTTP response mapping
//! - `extract`: Request extractors
//! - `middleware`: Rate limiting
//! - `routes`: API route handlers

pub mod app;
pub mod clients;
pub mod config;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod routes;
