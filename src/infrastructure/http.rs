use crate::config::ApiConfig;
use crate::domain::booking::{Booking, BookingRequest};
use crate::domain::ports::{BookingService, InitiateAck, InitiateRequest, PaymentGateway, VerificationOutcome};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

/// Shared request plumbing for the REST API adapters.
#[derive(Debug, Clone)]
struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

impl ApiClient {
    fn new(config: &ApiConfig) -> Result<Self> {
        // A trailing slash keeps Url::join from eating the last path segment.
        let base = if config.base_url.ends_with('/') {
            config.base_url.clone()
        } else {
            format!("{}/", config.base_url)
        };
        Ok(Self {
            http: reqwest::Client::new(),
            base_url: Url::parse(&base)?,
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let resp = self.http.get(self.url(path)?).send().await?;
        Self::handle_response(resp).await
    }

    async fn post<B: serde::Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let resp = self.http.post(self.url(path)?).json(body).send().await?;
        Self::handle_response(resp).await
    }

    /// Deserializes a success body, or extracts the `{error: ...}` payload
    /// the API puts on rejections so the session can show it verbatim.
    async fn handle_response<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp.json::<T>().await?);
        }
        let text = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .ok()
            .and_then(|body| body.error)
            .unwrap_or_else(|| {
                if text.is_empty() {
                    format!("request failed with status {status}")
                } else {
                    text
                }
            });
        Err(PaymentError::Rejected(message))
    }
}

/// M-Pesa gateway endpoints exposed by the backend.
#[derive(Debug, Clone)]
pub struct HttpPaymentGateway {
    client: ApiClient,
}

impl HttpPaymentGateway {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        Ok(Self {
            client: ApiClient::new(config)?,
        })
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn initiate_stk_push(&self, req: InitiateRequest) -> Result<InitiateAck> {
        self.client.post("payments/initiate", &req).await
    }

    async fn verify(&self, reference: &str) -> Result<VerificationOutcome> {
        self.client
            .post("payments/verify", &serde_json::json!({ "reference": reference }))
            .await
    }
}

#[derive(Debug, Deserialize)]
struct CreateBookingResponse {
    booking: Booking,
}

/// Booking endpoints exposed by the backend.
#[derive(Debug, Clone)]
pub struct HttpBookingService {
    client: ApiClient,
}

impl HttpBookingService {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        Ok(Self {
            client: ApiClient::new(config)?,
        })
    }
}

#[async_trait]
impl BookingService for HttpBookingService {
    async fn create_booking(&self, req: BookingRequest) -> Result<Booking> {
        req.validate()?;
        let resp: CreateBookingResponse = self.client.post("bookings", &req).await?;
        Ok(resp.booking)
    }

    async fn booking(&self, id: &str) -> Result<Booking> {
        self.client.get(&format!("bookings/{id}")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_joins_preserve_api_prefix() {
        let client = ApiClient::new(&ApiConfig {
            base_url: "http://localhost:8000/api".to_string(),
        })
        .unwrap();
        assert_eq!(
            client.url("payments/initiate").unwrap().as_str(),
            "http://localhost:8000/api/payments/initiate"
        );
        assert_eq!(
            client.url("bookings/b1").unwrap().as_str(),
            "http://localhost:8000/api/bookings/b1"
        );
    }

    #[test]
    fn test_error_body_extraction_shape() {
        let body: ErrorBody = serde_json::from_str(r#"{"error":"insufficient balance"}"#).unwrap();
        assert_eq!(body.error.as_deref(), Some("insufficient balance"));

        let body: ErrorBody = serde_json::from_str(r#"{"detail":"nope"}"#).unwrap();
        assert_eq!(body.error, None);
    }
}
