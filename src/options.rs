use std::fmt;
use std::str::FromStr;

use crate::error::Smtp2goError;

/// Regional API entry point. Routing through a region keeps the whole
/// exchange inside that jurisdiction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Region {
    Us,
    Eu,
    Au,
}

impl Region {
    /// Subdomain label used to build the region-qualified base URL.
    pub fn prefix(&self) -> &'static str {
        match self {
            Region::Us => "us",
            Region::Eu => "eu",
            Region::Au => "au",
        }
    }
}

impl FromStr for Region {
    type Err = Smtp2goError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "us" => Ok(Region::Us),
            "eu" => Ok(Region::Eu),
            "au" => Ok(Region::Au),
            other => Err(Smtp2goError::Config(format!(
                "unknown region \"{other}\": expected one of us, eu, au"
            ))),
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Configures dispatch timeouts, the retry budget and endpoint selection.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientOptions {
    /// Total delivery attempts allowed per dispatch. `1` disables failover.
    pub max_attempts: u32,
    /// Timeout for the first attempt, in milliseconds.
    pub timeout_ms: u64,
    /// Added to the timeout after each failed attempt, in milliseconds.
    pub timeout_increment_ms: u64,
    /// Regional entry point; `None` uses the global one.
    pub region: Option<Region>,
    /// Overrides the API base URL entirely. Mainly for test servers.
    pub base_url: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            timeout_ms: 30_000,
            timeout_increment_ms: 5_000,
            region: None,
            base_url: None,
        }
    }
}
