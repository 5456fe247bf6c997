//! Payment destination validation
//!
//! Format checks run before any state mutation or gateway call. Failures
//! here are plain validation errors: nothing has happened yet.

use crate::error::ValidationError;
use crate::payouts::types::{BankDetails, MobileMoneyDetails, PaymentDetails};
use regex::Regex;
use std::sync::OnceLock;

/// Mobile money networks the gateway can pay out to.
const SUPPORTED_NETWORKS: [&str; 3] = ["MTN", "VOD", "ATL"];

fn account_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{10,16}$").expect("valid account number regex"))
}

fn bank_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{3,6}$").expect("valid bank code regex"))
}

fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^0\d{9}$").expect("valid phone regex"))
}

/// Validate a payout destination before it is sent to the gateway.
pub fn validate_payment_details(details: &PaymentDetails) -> Result<(), ValidationError> {
    match details {
        PaymentDetails::Bank(bank) => validate_bank(bank),
        PaymentDetails::MobileMoney(momo) => validate_mobile_money(momo),
    }
}

fn validate_bank(details: &BankDetails) -> Result<(), ValidationError> {
    if details.account_name.trim().is_empty() {
        return Err(ValidationError::MissingPaymentDetails);
    }

    if !account_number_re().is_match(&details.account_number) {
        return Err(ValidationError::InvalidAccountNumber {
            value: details.account_number.clone(),
        });
    }

    if !bank_code_re().is_match(&details.bank_code) {
        return Err(ValidationError::InvalidBankCode {
            value: details.bank_code.clone(),
        });
    }

    Ok(())
}

fn validate_mobile_money(details: &MobileMoneyDetails) -> Result<(), ValidationError> {
    if details.account_name.trim().is_empty() {
        return Err(ValidationError::MissingPaymentDetails);
    }

    if !phone_re().is_match(&details.phone_number) {
        return Err(ValidationError::InvalidPhoneNumber {
            value: details.phone_number.clone(),
        });
    }

    let network = details.network_code.to_ascii_uppercase();
    if !SUPPORTED_NETWORKS.contains(&network.as_str()) {
        return Err(ValidationError::UnknownNetworkCode {
            value: details.network_code.clone(),
        });
    }

    Ok(())
}

/// A reversal must carry an explanation.
pub fn validate_reason(reason: &str) -> Result<(), ValidationError> {
    if reason.trim().is_empty() {
        return Err(ValidationError::MissingReason);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank(account_number: &str, bank_code: &str) -> PaymentDetails {
        PaymentDetails::Bank(BankDetails {
            account_name: "Ama Mensah".to_string(),
            account_number: account_number.to_string(),
            bank_code: bank_code.to_string(),
        })
    }

    fn momo(phone: &str, network: &str) -> PaymentDetails {
        PaymentDetails::MobileMoney(MobileMoneyDetails {
            account_name: "Kofi Boateng".to_string(),
            phone_number: phone.to_string(),
            network_code: network.to_string(),
        })
    }

    #[test]
    fn accepts_valid_bank_details() {
        assert!(validate_payment_details(&bank("0012345678", "030100")).is_ok());
    }

    #[test]
    fn rejects_short_account_number() {
        let result = validate_payment_details(&bank("12345", "030100"));
        assert!(matches!(
            result,
            Err(ValidationError::InvalidAccountNumber { .. })
        ));
    }

    #[test]
    fn rejects_non_numeric_bank_code() {
        let result = validate_payment_details(&bank("0012345678", "GCB"));
        assert!(matches!(result, Err(ValidationError::InvalidBankCode { .. })));
    }

    #[test]
    fn rejects_blank_account_name() {
        let details = PaymentDetails::Bank(BankDetails {
            account_name: "  ".to_string(),
            account_number: "0012345678".to_string(),
            bank_code: "030100".to_string(),
        });
        assert_eq!(
            validate_payment_details(&details),
            Err(ValidationError::MissingPaymentDetails)
        );
    }

    #[test]
    fn accepts_valid_mobile_money_details() {
        assert!(validate_payment_details(&momo("0244123456", "MTN")).is_ok());
    }

    #[test]
    fn network_code_is_case_insensitive() {
        assert!(validate_payment_details(&momo("0244123456", "mtn")).is_ok());
    }

    #[test]
    fn rejects_malformed_phone_number() {
        for phone in ["244123456", "02441234567", "+233244123456"] {
            let result = validate_payment_details(&momo(phone, "MTN"));
            assert!(
                matches!(result, Err(ValidationError::InvalidPhoneNumber { .. })),
                "phone {phone}"
            );
        }
    }

    #[test]
    fn rejects_unknown_network() {
        let result = validate_payment_details(&momo("0244123456", "GLO"));
        assert!(matches!(
            result,
            Err(ValidationError::UnknownNetworkCode { .. })
        ));
    }

    #[test]
    fn reason_must_be_non_empty() {
        assert!(validate_reason("chargeback dispute upheld").is_ok());
        assert_eq!(validate_reason("   "), Err(ValidationError::MissingReason));
    }
}
