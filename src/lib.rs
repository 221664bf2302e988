//! This crate delivers mail of a host e-commerce platform
//! through the [Mailtrap](https://mailtrap.io) SMTP relay.
//!
//! A [`MailtrapTransport`] is created for one message.
//! It reads the relay credentials from the host's configuration,
//! decrypts them, optionally rewrites the return-path of the message
//! and hands the message to a `lettre` SMTP client.
//!
//! The return-path is controlled by
//! [`XML_PATH_SENDING_SET_RETURN_PATH`](config::XML_PATH_SENDING_SET_RETURN_PATH):
//! `0` leaves the message alone, `1` uses the first `From` address
//! and `2` uses the address stored at
//! [`XML_PATH_SENDING_RETURN_PATH_EMAIL`](config::XML_PATH_SENDING_RETURN_PATH_EMAIL).
//!
//! # Examples
//!
//! ```
//! # tokio_test::block_on(async {
//! use std::sync::Arc;
//!
//! use mailtrap_transport::{
//!     config::{XML_PATH_MAILTRAP_PASSWORD, XML_PATH_MAILTRAP_USERNAME},
//!     Cause, MailtrapTransport, MemoryConfig, RawMessage,
//! };
//!
//! let config = MemoryConfig::new()
//!     .with(XML_PATH_MAILTRAP_USERNAME, "encrypted-user")
//!     .with(XML_PATH_MAILTRAP_PASSWORD, "encrypted-password");
//!
//! // the host platform has lost its key
//! let decrypt = |_: &str| -> String { String::new() };
//!
//! let transport = MailtrapTransport::new(
//!     RawMessage::new("From: shop@example.com\r\nTo: you@example.com\r\n\r\nHi"),
//!     Arc::new(config),
//!     Arc::new(decrypt),
//! );
//!
//! let error = transport.send_message().await.unwrap_err();
//! assert!(matches!(error.cause(), Cause::InvalidCredentials));
//! # })
//! ```

#![forbid(unsafe_code)]

pub mod config;
mod crypto;
mod message;
pub mod smtp;
mod transport;

pub use config::{Endpoint, MemoryConfig, ReturnPathMode, Scope, ScopeConfig};
pub use crypto::Decryptor;
pub use message::{
    EnvelopeError, MailMessage, ParseError, ParsedMessage, RawMessage,
};
pub use transport::{Cause, MailtrapTransport, SendError};
