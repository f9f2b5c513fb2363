//! First sign-in profile submission.
//!
//! New accounts carry `custom:first_sign_in = "true"` in their ID token until
//! the user submits an organisation and, optionally, a location.

use crate::config::ClientConfig;
use crate::error::RemediateError;
use crate::identity::IdToken;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use tracing::info;

const NOT_APPLICABLE: &str = "N/A";

/// Details collected on first sign-in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnboardingProfile {
    pub organization: String,
    /// ISO country code.
    pub country: Option<String>,
    /// ISO subdivision code.
    pub state: Option<String>,
    pub city: Option<String>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct OnboardingRequest<'a> {
    sub: &'a str,
    organization: &'a str,
    country: &'a str,
    state: &'a str,
    city: &'a str,
}

impl OnboardingProfile {
    pub fn new(organization: impl Into<String>) -> Self {
        Self {
            organization: organization.into(),
            ..Self::default()
        }
    }

    fn request<'a>(&'a self, sub: &'a str) -> Result<OnboardingRequest<'a>, RemediateError> {
        let organization = self.organization.trim();
        if organization.is_empty() {
            return Err(RemediateError::IncompleteProfile {
                field: "organization",
            });
        }
        let or_na = |v: &'a Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(NOT_APPLICABLE)
        };
        Ok(OnboardingRequest {
            sub,
            organization,
            country: or_na(&self.country),
            state: or_na(&self.state),
            city: or_na(&self.city),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Client for the first-sign-in endpoint.
#[derive(Debug, Clone)]
pub struct OnboardingClient {
    http: reqwest::Client,
    url: String,
}

impl OnboardingClient {
    pub fn new(config: &ClientConfig) -> Result<Self, RemediateError> {
        let url = config.first_sign_in_api_url.clone().ok_or_else(|| {
            RemediateError::InvalidConfig("first sign-in API URL is not configured".into())
        })?;
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .build()
            .map_err(|e| RemediateError::Internal(e.to_string()))?;
        Ok(Self { http, url })
    }

    /// Submit `profile` for the token's user.
    pub async fn submit(
        &self,
        token: &IdToken,
        profile: &OnboardingProfile,
    ) -> Result<(), RemediateError> {
        let body = profile.request(token.sub()?)?;
        let response = self
            .http
            .post(&self.url)
            .header(AUTHORIZATION, format!("Bearer {}", token.bearer()))
            .json(&body)
            .send()
            .await
            .map_err(|e| RemediateError::OnboardingRejected {
                status: 0,
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let err: ErrorBody = response.json().await.unwrap_or_default();
            return Err(RemediateError::OnboardingRejected {
                status: status.as_u16(),
                message: err.message.unwrap_or_else(|| "unknown error".to_string()),
            });
        }
        info!("Profile submitted for organisation '{}'", body.organization);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_location_is_not_applicable() {
        let profile = OnboardingProfile {
            organization: " Acme University ".into(),
            country: Some("US".into()),
            state: None,
            city: Some("".into()),
        };
        let req = profile.request("sub-1").unwrap();
        assert_eq!(
            req,
            OnboardingRequest {
                sub: "sub-1",
                organization: "Acme University",
                country: "US",
                state: "N/A",
                city: "N/A",
            }
        );
    }

    #[test]
    fn organization_is_required() {
        let err = OnboardingProfile::new("   ").request("sub-1").unwrap_err();
        assert!(matches!(
            err,
            RemediateError::IncompleteProfile {
                field: "organization"
            }
        ));
    }

    #[test]
    fn client_requires_url() {
        assert!(OnboardingClient::new(&ClientConfig::default()).is_err());
    }
}
