//! `smtp2go-http` is an async client for the SMTP2GO HTTPS API.
//!
//! Payloads are described by [`BuildsRequest`] implementations and
//! dispatched with [`Smtp2goClient::send`], which can retry
//! network-layer failures against alternate server addresses discovered
//! through DNS. The moving parts:
//! - [`Smtp2goClient::send`]
//! - [`mail::MailSend`]
//! - [`DispatchResult`]

mod classify;
mod client;
mod error;
pub mod mail;
mod options;
mod pool;
mod resolve;
mod service;
mod transport;
mod types;

pub use client::{Smtp2goClient, API_HOST, API_URL};
pub use error::Smtp2goError;
pub use options::{ClientOptions, Region};
pub use pool::ServerPool;
pub use resolve::{DnsResolver, ResolveHost};
pub use service::{BuildsRequest, Service};
pub use transport::{HttpTransport, Transport, TransportCall, TransportError};
pub use types::{AttemptRecord, DispatchResult, RequestSnapshot, ResponseSnapshot};

pub type Result<T> = std::result::Result<T, Smtp2goError>;
