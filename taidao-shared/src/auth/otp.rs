/// One-time login codes
///
/// Codes are six decimal digits drawn uniformly from `100000..=999999`, so
/// they never start with a zero and always render at full width.

use rand::rngs::OsRng;
use rand::Rng;

/// Smallest code that can be issued
pub const OTP_MIN: u32 = 100_000;

/// Largest code that can be issued
pub const OTP_MAX: u32 = 999_999;

/// Generates a fresh six-digit code
///
/// # Example
///
/// ```
/// use taidao_shared::auth::otp::generate_otp_code;
///
/// let code = generate_otp_code();
/// assert_eq!(code.len(), 6);
/// ```
pub fn generate_otp_code() -> String {
    OsRng.gen_range(OTP_MIN..=OTP_MAX).to_string()
}

/// Checks that `code` has the shape of an issued code
pub fn is_valid_otp_code(code: &str) -> bool {
    code.len() == 6
        && code.bytes().all(|b| b.is_ascii_digit())
        && code
            .parse::<u32>()
            .map(|n| (OTP_MIN..=OTP_MAX).contains(&n))
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_codes_are_in_range() {
        for _ in 0..1000 {
            let code = generate_otp_code();
            assert!(is_valid_otp_code(&code), "bad code {}", code);
        }
    }

    #[test]
    fn test_is_valid_otp_code() {
        assert!(is_valid_otp_code("100000"));
        assert!(is_valid_otp_code("999999"));
        assert!(!is_valid_otp_code("099999"));
        assert!(!is_valid_otp_code("12345"));
        assert!(!is_valid_otp_code("1234567"));
        assert!(!is_valid_otp_code("12a456"));
        assert!(!is_valid_otp_code("+12345"));
        assert!(!is_valid_otp_code(""));
    }
}
