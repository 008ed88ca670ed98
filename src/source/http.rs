use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;

use super::RemoteAppointmentSource;
use crate::error::FetchError;
use crate::models::appointment::AppointmentSnapshot;

/// Fetches `{ "upcoming": [...] }` from the booking backend over HTTP.
pub struct HttpAppointmentSource {
    client: Client,
    url: String,
    token: Option<String>,
}

impl HttpAppointmentSource {
    pub fn new(url: String, token: Option<String>, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url, token })
    }
}

#[async_trait]
impl RemoteAppointmentSource for HttpAppointmentSource {
    async fn fetch(&self) -> Result<AppointmentSnapshot, FetchError> {
        let mut request = self.client.get(&self.url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        debug!(url = %self.url, status = status.as_u16(), "appointments fetched");

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(FetchError::Unauthorized(status.as_u16()))
            }
            s if !s.is_success() => Err(FetchError::Status(s.as_u16())),
            _ => {
                let snapshot = response.json::<AppointmentSnapshot>().await?;
                if snapshot.is_empty() {
                    debug!(url = %self.url, "no upcoming appointments");
                }
                Ok(snapshot)
            }
        }
    }
}
