//! Response envelope handling.
//!
//! Every Hyperstack response carries a `status` flag and a `message`
//! alongside its payload. The flag is a boolean on most endpoints and an
//! integer on a few; both are accepted, with any non-zero integer treated as
//! success. A missing flag counts as failure.

use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::HyperstackError;

/// Statuses accepted for reads and mutations.
pub(super) const ACCEPTED: &[u16] = &[200, 201];

/// Statuses accepted for deletions.
pub(super) const ACCEPTED_DELETE: &[u16] = &[200, 201, 204];

/// Raw HTTP reply captured before decoding.
#[derive(Clone, Debug, Eq, PartialEq)]
pub(super) struct Reply {
    pub(super) endpoint: String,
    pub(super) status: u16,
    pub(super) body: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StatusFlag {
    Flag(bool),
    Code(i64),
}

impl StatusFlag {
    const fn is_success(&self) -> bool {
        match self {
            Self::Flag(flag) => *flag,
            Self::Code(code) => *code != 0,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    status: Option<StatusFlag>,
    #[serde(default)]
    message: Option<String>,
}

impl Reply {
    fn check_status(&self, accepted: &[u16]) -> Result<(), HyperstackError> {
        if accepted.contains(&self.status) {
            return Ok(());
        }
        Err(HyperstackError::Http {
            endpoint: self.endpoint.clone(),
            status: self.status,
            body: self.body.clone(),
        })
    }

    fn api_failure(&self, envelope: Envelope) -> HyperstackError {
        HyperstackError::Api {
            endpoint: self.endpoint.clone(),
            message: envelope
                .message
                .filter(|message| !message.trim().is_empty())
                .unwrap_or_else(|| String::from("no message returned")),
        }
    }

    fn decode_failure(&self, err: &serde_json::Error) -> HyperstackError {
        HyperstackError::Decode {
            endpoint: self.endpoint.clone(),
            message: err.to_string(),
        }
    }

    /// Validates the status and envelope, then decodes the payload.
    pub(super) fn decode<T: DeserializeOwned>(&self) -> Result<T, HyperstackError> {
        self.check_status(ACCEPTED)?;
        let envelope: Envelope =
            serde_json::from_str(&self.body).map_err(|err| self.decode_failure(&err))?;
        if !envelope
            .status
            .as_ref()
            .is_some_and(StatusFlag::is_success)
        {
            return Err(self.api_failure(envelope));
        }
        serde_json::from_str(&self.body).map_err(|err| self.decode_failure(&err))
    }

    /// Validates a deletion reply, which may have an empty body.
    pub(super) fn accept_delete(&self) -> Result<(), HyperstackError> {
        self.check_status(ACCEPTED_DELETE)?;
        if self.body.trim().is_empty() {
            return Ok(());
        }
        match serde_json::from_str::<Envelope>(&self.body) {
            Ok(envelope)
                if envelope
                    .status
                    .as_ref()
                    .is_some_and(|flag| !flag.is_success()) =>
            {
                Err(self.api_failure(envelope))
            }
            _ => Ok(()),
        }
    }
}
