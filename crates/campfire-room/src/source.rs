//! Where the roster fallback comes from.
//!
//! A participant can miss `join` broadcasts that went out before it
//! subscribed. On entering a room it asks a [`RosterSource`] once for the
//! current membership and merges the answer in. The answer is advisory:
//! broadcasts stay the source of truth.

use std::future::Future;

use campfire_protocol::{RoomName, Username};

use crate::RoomError;

/// A point-in-time view of who is in a room.
pub trait RosterSource: Send + Sync + 'static {
    fn fetch(
        &self,
        room: &RoomName,
    ) -> impl Future<Output = Result<Vec<Username>, RoomError>> + Send;
}

/// No fallback: always an empty roster.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRoster;

impl RosterSource for NoRoster {
    async fn fetch(&self, _room: &RoomName) -> Result<Vec<Username>, RoomError> {
        Ok(Vec::new())
    }
}

/// A fixed roster, for tests and demos.
#[derive(Debug, Clone, Default)]
pub struct StaticRoster(pub Vec<Username>);

impl RosterSource for StaticRoster {
    async fn fetch(&self, _room: &RoomName) -> Result<Vec<Username>, RoomError> {
        Ok(self.0.clone())
    }
}

#[cfg(feature = "http")]
pub use http::HttpRosterSource;

#[cfg(feature = "http")]
mod http {
    use std::time::Duration;

    use campfire_protocol::{RoomName, Username};
    use tracing::{debug, warn};

    use super::RosterSource;
    use crate::RoomError;

    /// Fetches `GET {base_url}/api/rooms/{room}/users`, a JSON array of
    /// usernames, from the room catalog.
    #[derive(Debug, Clone)]
    pub struct HttpRosterSource {
        base_url: String,
        client: reqwest::Client,
    }

    impl HttpRosterSource {
        pub fn new(base_url: impl Into<String>) -> Self {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|e| {
                    warn!(error = %e, "failed to build HTTP client with timeout, using defaults");
                    reqwest::Client::new()
                });
            Self::with_client(base_url, client)
        }

        pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
            Self {
                base_url: base_url.into().trim_end_matches('/').to_string(),
                client,
            }
        }

        pub fn url_for(&self, room: &RoomName) -> String {
            format!("{}/api/rooms/{}/users", self.base_url, room)
        }
    }

    impl RosterSource for HttpRosterSource {
        async fn fetch(&self, room: &RoomName) -> Result<Vec<Username>, RoomError> {
            let url = self.url_for(room);
            debug!(%url, "fetching roster");

            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| RoomError::RosterUnavailable(e.to_string()))?;

            if !response.status().is_success() {
                return Err(RoomError::RosterUnavailable(format!(
                    "{url} returned {}",
                    response.status()
                )));
            }

            response
                .json::<Vec<Username>>()
                .await
                .map_err(|e| RoomError::RosterUnavailable(e.to_string()))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_url_for_trims_trailing_slash() {
            let source = HttpRosterSource::new("http://localhost:8080/");
            assert_eq!(
                source.url_for(&RoomName::new("den")),
                "http://localhost:8080/api/rooms/den/users"
            );
        }
    }
}
