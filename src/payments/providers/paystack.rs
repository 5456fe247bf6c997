//! Paystack transfer gateway implementation
//!
//! Integrates with Paystack's transfer API: recipient creation, transfer
//! initiation, OTP finalization and status verification, for bank
//! (`ghipss`) and mobile money payouts in GHS.

use crate::payments::error::{GatewayError, GatewayResult};
use crate::payments::traits::TransferGateway;
use crate::payments::types::{TransferInstruction, TransferProbe, TransferReceipt};
use crate::payouts::types::PaymentDetails;
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use tracing::{error, info, warn};

/// Paystack gateway configuration
#[derive(Debug, Clone)]
pub struct PaystackConfig {
    /// Paystack API secret key
    pub secret_key: String,
    /// Paystack API base URL (defaults to https://api.paystack.co)
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Maximum number of retries for failed requests
    pub max_retries: u32,
}

impl Default for PaystackConfig {
    fn default() -> Self {
        Self {
            secret_key: String::new(),
            base_url: "https://api.paystack.co".to_string(),
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

impl PaystackConfig {
    /// Create config from environment variables
    pub fn from_env() -> GatewayResult<Self> {
        let secret_key = std::env::var("PAYSTACK_SECRET_KEY").map_err(|_| {
            GatewayError::configuration("PAYSTACK_SECRET_KEY environment variable is required")
        })?;

        let base_url = std::env::var("PAYSTACK_BASE_URL")
            .unwrap_or_else(|_| "https://api.paystack.co".to_string());

        let timeout_secs = std::env::var("PAYSTACK_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);

        let max_retries = std::env::var("PAYSTACK_MAX_RETRIES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3);

        Ok(Self {
            secret_key,
            base_url,
            timeout_secs,
            max_retries,
        })
    }
}

/// Paystack transfer gateway
pub struct PaystackGateway {
    config: PaystackConfig,
    client: Client,
}

impl PaystackGateway {
    /// Create a new Paystack gateway instance
    pub fn new(config: PaystackConfig) -> GatewayResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                GatewayError::configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { config, client })
    }

    /// Create gateway from environment variables
    pub fn from_env() -> GatewayResult<Self> {
        let config = PaystackConfig::from_env()?;
        Self::new(config)
    }

    /// Make an authenticated request to the Paystack API
    async fn make_request<T>(
        &self,
        method: reqwest::Method,
        endpoint: &str,
        body: Option<&serde_json::Value>,
    ) -> GatewayResult<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let url = format!("{}{}", self.config.base_url, endpoint);
        let mut request = self
            .client
            .request(method, &url)
            .header("Authorization", format!("Bearer {}", self.config.secret_key))
            .header("Content-Type", "application/json");

        if let Some(body) = body {
            request = request.json(body);
        }

        let mut last_error = None;
        for attempt in 0..=self.config.max_retries {
            let req = request.try_clone().ok_or_else(|| {
                GatewayError::transport("Failed to clone request".to_string())
            })?;

            match req.send().await {
                Ok(response) => {
                    let status = response.status();
                    let response_text = response.text().await.unwrap_or_default();

                    if status.is_success() {
                        let envelope: PaystackEnvelope<T> = serde_json::from_str(&response_text)
                            .map_err(|e| {
                                error!("Failed to parse Paystack response: {}", e);
                                GatewayError::invalid_response(format!(
                                    "Invalid response format: {}",
                                    e
                                ))
                            })?;

                        if envelope.status {
                            return envelope.data.ok_or_else(|| {
                                GatewayError::invalid_response(
                                    "Response envelope missing data".to_string(),
                                )
                            });
                        }

                        error!("Paystack API error: {}", envelope.message);
                        return Err(GatewayError::provider(envelope.message, false));
                    } else if status == 429 {
                        // Rate limit - retry with backoff
                        if attempt < self.config.max_retries {
                            let backoff = 2_u64.pow(attempt);
                            warn!(
                                "Rate limited, retrying after {} seconds (attempt {})",
                                backoff,
                                attempt + 1
                            );
                            tokio::time::sleep(Duration::from_secs(backoff)).await;
                            continue;
                        }
                        return Err(GatewayError::RateLimit {
                            retry_after: Some(60),
                        });
                    } else if status.is_server_error() && attempt < self.config.max_retries {
                        // Server error - retry
                        let backoff = 2_u64.pow(attempt);
                        warn!(
                            "Server error {}, retrying after {} seconds (attempt {})",
                            status,
                            backoff,
                            attempt + 1
                        );
                        tokio::time::sleep(Duration::from_secs(backoff)).await;
                        continue;
                    } else {
                        let error_msg = format!("HTTP {}: {}", status, response_text);
                        error!("Paystack API error: {}", error_msg);
                        return Err(GatewayError::provider(error_msg, status.is_server_error()));
                    }
                }
                Err(e) => {
                    if attempt < self.config.max_retries {
                        let backoff = 2_u64.pow(attempt);
                        warn!(
                            "Request error, retrying after {} seconds (attempt {}): {}",
                            backoff,
                            attempt + 1,
                            e
                        );
                        last_error = Some(e);
                        tokio::time::sleep(Duration::from_secs(backoff)).await;
                        continue;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(GatewayError::transport(format!(
            "Request failed after {} retries: {}",
            self.config.max_retries,
            last_error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string())
        )))
    }
}

/// Convert a major-unit amount (cedis) to Paystack's minor units
/// (pesewas). Rejects negative amounts and sub-pesewa precision.
fn to_minor_units(amount: Decimal) -> GatewayResult<u64> {
    if amount < Decimal::ZERO {
        return Err(GatewayError::invalid_response(format!(
            "Negative transfer amount: {}",
            amount
        )));
    }

    let scaled = amount * Decimal::from(100);
    if scaled.fract() != Decimal::ZERO {
        return Err(GatewayError::invalid_response(format!(
            "Transfer amount {} has sub-pesewa precision",
            amount
        )));
    }

    scaled.to_u64().ok_or_else(|| {
        GatewayError::invalid_response(format!("Transfer amount {} out of range", amount))
    })
}

#[async_trait]
impl TransferGateway for PaystackGateway {
    async fn create_recipient(&self, details: &PaymentDetails) -> GatewayResult<String> {
        let payload = match details {
            PaymentDetails::Bank(bank) => serde_json::json!({
                "type": "ghipss",
                "name": bank.account_name,
                "account_number": bank.account_number,
                "bank_code": bank.bank_code,
                "currency": "GHS",
            }),
            PaymentDetails::MobileMoney(momo) => serde_json::json!({
                "type": "mobile_money",
                "name": momo.account_name,
                "account_number": momo.phone_number,
                "bank_code": momo.network_code,
                "currency": "GHS",
            }),
        };

        let recipient: PaystackRecipientData = self
            .make_request(reqwest::Method::POST, "/transferrecipient", Some(&payload))
            .await?;

        info!(
            "Paystack recipient created: recipient_code={}",
            recipient.recipient_code
        );

        Ok(recipient.recipient_code)
    }

    async fn initiate_transfer(
        &self,
        instruction: &TransferInstruction,
    ) -> GatewayResult<TransferReceipt> {
        info!(
            "Initiating Paystack transfer: {} {} reference={}",
            instruction.amount, instruction.currency, instruction.reference
        );

        let mut payload = serde_json::json!({
            "source": "balance",
            "amount": to_minor_units(instruction.amount)?,
            "currency": instruction.currency,
            "recipient": instruction.recipient_code,
            "reference": instruction.reference,
        });

        if let Some(reason) = &instruction.reason {
            payload["reason"] = serde_json::Value::String(reason.clone());
        }

        let transfer: PaystackTransferData = self
            .make_request(reqwest::Method::POST, "/transfer", Some(&payload))
            .await?;

        info!(
            "Paystack transfer initiated: transfer_code={}, status={}",
            transfer.transfer_code, transfer.status
        );

        // "otp" means Paystack is holding the transfer until a second
        // factor is submitted.
        let requires_approval = transfer.status == "otp";

        Ok(TransferReceipt {
            transfer_id: transfer.id.to_string(),
            transfer_code: transfer.transfer_code,
            reference: transfer.reference,
            gateway_status: transfer.status,
            requires_approval,
        })
    }

    async fn verify_transfer(&self, transfer_id: &str) -> GatewayResult<TransferProbe> {
        info!("Verifying Paystack transfer: transfer_id={}", transfer_id);

        let transfer: PaystackTransferData = self
            .make_request(
                reqwest::Method::GET,
                &format!("/transfer/{}", transfer_id),
                None,
            )
            .await?;

        info!(
            "Paystack transfer verified: transfer_id={}, status={}",
            transfer_id, transfer.status
        );

        Ok(TransferProbe {
            requires_pin: transfer.status == "otp",
            gateway_status: transfer.status,
        })
    }

    async fn finalize_transfer(
        &self,
        transfer_code: &str,
        otp: &str,
    ) -> GatewayResult<TransferProbe> {
        info!(
            "Finalizing Paystack transfer: transfer_code={}",
            transfer_code
        );

        let payload = serde_json::json!({
            "transfer_code": transfer_code,
            "otp": otp,
        });

        let transfer: PaystackTransferData = self
            .make_request(
                reqwest::Method::POST,
                "/transfer/finalize_transfer",
                Some(&payload),
            )
            .await?;

        Ok(TransferProbe {
            requires_pin: transfer.status == "otp",
            gateway_status: transfer.status,
        })
    }

    fn validate_webhook_signature(&self, payload: &[u8], signature: &str) -> bool {
        use hmac::{Hmac, Mac};
        use sha2::Sha512;

        type HmacSha512 = Hmac<Sha512>;

        let mut mac = HmacSha512::new_from_slice(self.config.secret_key.as_bytes())
            .expect("HMAC can take key of any size");

        mac.update(payload);
        let computed_signature = hex::encode(mac.finalize().into_bytes());

        // Paystack sends signature as hex string
        let provided_signature = signature.trim();

        // Constant-time comparison to prevent timing attacks
        if computed_signature.len() != provided_signature.len() {
            return false;
        }

        computed_signature
            .as_bytes()
            .iter()
            .zip(provided_signature.as_bytes().iter())
            .fold(0, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

// Paystack API response wrapper
#[derive(Debug, Deserialize)]
struct PaystackEnvelope<T> {
    status: bool,
    message: String,
    data: Option<T>,
}

// Transfer recipient response
#[derive(Debug, Deserialize)]
struct PaystackRecipientData {
    recipient_code: String,
}

// Transfer response (initiation, verification and finalization share it)
#[derive(Debug, Deserialize)]
struct PaystackTransferData {
    id: u64,
    transfer_code: String,
    reference: String,
    status: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn create_test_gateway() -> PaystackGateway {
        let config = PaystackConfig {
            secret_key: "sk_test_test_key".to_string(),
            base_url: "https://api.paystack.co".to_string(),
            timeout_secs: 30,
            max_retries: 3,
        };
        PaystackGateway::new(config).unwrap()
    }

    #[test]
    fn test_webhook_signature_validation_invalid() {
        let gateway = create_test_gateway();
        let payload = b"test payload";
        let signature = "invalid_signature";
        let result = gateway.validate_webhook_signature(payload, signature);
        assert!(!result, "Invalid signature should return false");
    }

    #[test]
    fn test_webhook_signature_validation_valid() {
        use hmac::{Hmac, Mac};
        use sha2::Sha512;

        let gateway = create_test_gateway();
        let payload = b"{\"event\":\"transfer.success\"}";

        let mut mac = Hmac::<Sha512>::new_from_slice(b"sk_test_test_key").unwrap();
        mac.update(payload);
        let signature = hex::encode(mac.finalize().into_bytes());

        assert!(gateway.validate_webhook_signature(payload, &signature));
    }

    #[test]
    fn test_paystack_config_default() {
        let config = PaystackConfig::default();
        assert_eq!(config.base_url, "https://api.paystack.co");
        assert_eq!(config.timeout_secs, 30);
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_minor_unit_conversion() {
        assert_eq!(to_minor_units(Decimal::from(200)).unwrap(), 20_000);
        assert_eq!(
            to_minor_units(Decimal::from_str("184.50").unwrap()).unwrap(),
            18_450
        );
        assert_eq!(to_minor_units(Decimal::ZERO).unwrap(), 0);
    }

    #[test]
    fn test_minor_unit_conversion_rejects_sub_pesewa() {
        assert!(to_minor_units(Decimal::from_str("10.005").unwrap()).is_err());
    }

    #[test]
    fn test_minor_unit_conversion_rejects_negative() {
        assert!(to_minor_units(Decimal::from(-5)).is_err());
    }
}
