/// Error type returned by this crate.
///
/// Ordinary delivery failures (timeouts, refused connections, 4xx/5xx
/// replies) are not errors here; they are folded into the
/// [`DispatchResult`](crate::DispatchResult) of the call that observed them.
#[derive(Debug, thiserror::Error)]
pub enum Smtp2goError {
    /// The client was configured with a value the API cannot accept.
    #[error("configuration error: {0}")]
    Config(String),
    /// A failure outside the retryable classes; dispatch stops immediately.
    #[error("fatal dispatch error: {0}")]
    Fatal(String),
}
