use std::net::IpAddr;

use reqwest::StatusCode;

use crate::transport::TransportError;
use crate::types::ResponseSnapshot;

/// How one delivery attempt ended, from the dispatcher's point of view.
#[derive(Debug)]
pub(crate) enum AttemptOutcome {
    /// The server accepted the exchange (anything outside 4xx/5xx).
    Success(ResponseSnapshot),
    /// Definitive rejection of the request itself (4xx). Another attempt
    /// would be rejected the same way, so none is made.
    Rejected(ResponseSnapshot),
    /// Connectivity trouble or a server-side error (5xx). A different
    /// server address may well answer.
    Transient {
        error: String,
        response: Option<ResponseSnapshot>,
        address: Option<IpAddr>,
    },
    /// Anything the transport could not attribute to the network.
    Fatal(String),
}

/// Sorts a transport result into the class that drives the retry decision.
/// 5xx replies are treated exactly like connection failures: the server
/// answered, but another address may hold a healthier instance.
pub(crate) fn classify(
    result: Result<ResponseSnapshot, TransportError>,
) -> AttemptOutcome {
    match result {
        Ok(response) if (400..500).contains(&response.status) => AttemptOutcome::Rejected(response),
        Ok(response) if response.status >= 500 => {
            let error = describe_status(response.status);
            let address = response.remote_addr;
            AttemptOutcome::Transient {
                error,
                response: Some(response),
                address,
            }
        }
        Ok(response) => AttemptOutcome::Success(response),
        Err(TransportError::Connectivity { message, address }) => AttemptOutcome::Transient {
            error: message,
            response: None,
            address,
        },
        Err(TransportError::Other { message }) => AttemptOutcome::Fatal(message),
    }
}

fn describe_status(status: u16) -> String {
    let reason = StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason());
    match reason {
        Some(reason) => format!("server error: {status} {reason}"),
        None => format!("server error: {status}"),
    }
}
