use serde::Deserialize;
use tracing::{debug, warn};

use donna_core::types::CallId;

use crate::error::{Result, TransportError};

const TWILIO_API: &str = "https://api.twilio.com/2010-04-01";

/// Minimal Twilio REST client — the one thing the core asks of it is
/// placing outbound calls that answer into the media-stream webhook.
pub struct TwilioClient {
    client: reqwest::Client,
    account_sid: String,
    auth_token: String,
    from_number: String,
    base_url: String,
}

impl TwilioClient {
    pub fn new(account_sid: String, auth_token: String, from_number: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            account_sid,
            auth_token,
            from_number,
            base_url: TWILIO_API.to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    /// Place an outbound call. Twilio fetches TwiML from `webhook_url` when
    /// the callee answers; the returned call sid keys all per-call state.
    pub async fn create_call(&self, to: &str, webhook_url: &str) -> Result<CallId> {
        let url = format!(
            "{}/Accounts/{}/Calls.json",
            self.base_url, self.account_sid
        );

        debug!(to = %to, "placing outbound call");

        let resp = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[
                ("To", to),
                ("From", self.from_number.as_str()),
                ("Url", webhook_url),
                ("Method", "POST"),
            ])
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(status, body = %body, "Twilio call creation failed");
            return Err(TransportError::Api {
                status,
                message: body,
            });
        }

        let created: CallCreated = resp
            .json()
            .await
            .map_err(|e| TransportError::Malformed(e.to_string()))?;

        debug!(call_sid = %created.sid, "outbound call created");
        Ok(CallId(created.sid))
    }
}

#[derive(Deserialize)]
struct CallCreated {
    sid: String,
}

/// Normalize a phone number to its last ten digits — the key for the
/// manual-call prefetch stash, stable across +1/1/plain formatting.
pub fn normalize_phone(number: &str) -> String {
    let digits: String = number.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() > 10 {
        digits[digits.len() - 10..].to_string()
    } else {
        digits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_formatting_and_country_code() {
        assert_eq!(normalize_phone("+1 (555) 123-4567"), "5551234567");
        assert_eq!(normalize_phone("15551234567"), "5551234567");
        assert_eq!(normalize_phone("555-1234"), "5551234");
    }
}
