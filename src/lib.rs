//! # Passkey Provisioning Server
//!
//! WebAuthn/Passkey registration that provisions a matching Keycloak account
//! with default realm roles once the passkey has been verified.
//!
//! ## Key Concepts
//! - **WebAuthn**: Web Authentication API for passwordless authentication
//! - **Passkeys**: User-friendly implementation of WebAuthn credentials
//! - **Provisioning**: creating the identity provider account, retried with
//!   backoff and rolled back if a later step fails

pub mod app;        // Router and middleware stack
pub mod config;     // Configuration management (environment variables, settings)
pub mod db;         // Database operations (users, credentials)
pub mod error;      // Error handling and custom error types
pub mod handlers;   // HTTP request handlers (routes)
pub mod identity;   // Identity provider (Keycloak) integration
pub mod middleware; // Request/response interceptors (authentication checks)
pub mod retry;      // Retry with exponential backoff
pub mod roles;      // Default role policy
pub mod state;      // Shared application state
pub mod webauthn;   // WebAuthn/Passkey logic
