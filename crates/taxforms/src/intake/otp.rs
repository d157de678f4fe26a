use rand::Rng;
use tracing::info;

pub const OTP_DIGITS: usize = 6;

#[derive(Debug, thiserror::Error)]
pub enum OtpError {
    #[error("one-time password does not match")]
    InvalidCode,
    #[error("one-time password delivery failed: {0}")]
    Delivery(String),
}

/// Outbound channel for one-time passwords (SMS gateway, e-mail, ...).
pub trait OtpDelivery: Send + Sync {
    fn deliver(&self, phone_number: &str, code: &str) -> Result<(), OtpError>;
}

/// Writes a delivery notice to the log instead of sending anything.
#[derive(Debug, Default, Clone)]
pub struct LoggingOtpDelivery;

impl OtpDelivery for LoggingOtpDelivery {
    fn deliver(&self, phone_number: &str, _code: &str) -> Result<(), OtpError> {
        info!(phone = %mask_phone(phone_number), "one-time password issued");
        Ok(())
    }
}

pub fn generate_code() -> String {
    let value: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{value:0width$}", width = OTP_DIGITS)
}

pub fn mask_phone(phone_number: &str) -> String {
    let tail: String = phone_number
        .chars()
        .skip(phone_number.chars().count().saturating_sub(4))
        .collect();
    format!("******{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_six_ascii_digits() {
        for _ in 0..50 {
            let code = generate_code();
            assert_eq!(code.len(), OTP_DIGITS);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn masks_all_but_last_four_digits() {
        assert_eq!(mask_phone("4165551234"), "******1234");
        assert_eq!(mask_phone("12"), "******12");
    }
}
