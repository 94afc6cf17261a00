//! TOTP seed issuance and validation (RFC 6238).
//!
//! Seeds are issued per-user at signup and stored base32-encoded.
//! Codes are six digits over a 30-second step with one step of skew,
//! matching what every common authenticator app produces.

use totp_rs::{Algorithm, Secret, TOTP};

use parley_types::{ParleyError, Result};

/// Code length in digits.
const DIGITS: usize = 6;

/// Accepted steps of clock skew either side of now.
const SKEW: u8 = 1;

/// Step length in seconds.
const STEP: u64 = 30;

/// Generates a fresh base32 seed for a new user.
pub fn generate_seed() -> String {
    match Secret::generate_secret().to_encoded() {
        Secret::Encoded(seed) => seed,
        // to_encoded always yields the encoded form.
        Secret::Raw(_) => String::new(),
    }
}

/// Checks `code` against the stored base32 `seed` at the current time.
///
/// An undecodable seed is an internal error; a wrong code is
/// `Ok(false)`.
pub fn verify(seed: &str, code: &str) -> Result<bool> {
    totp_for(seed)?
        .check_current(code)
        .map_err(|_| ParleyError::General)
}

/// The valid code for `seed` right now, as an authenticator app would
/// show it. Used by clients and test harnesses; the proxy itself only
/// ever verifies.
pub fn current_code(seed: &str) -> Result<String> {
    totp_for(seed)?
        .generate_current()
        .map_err(|_| ParleyError::General)
}

fn totp_for(seed: &str) -> Result<TOTP> {
    let secret = Secret::Encoded(seed.to_string())
        .to_bytes()
        .map_err(|_| ParleyError::General)?;

    TOTP::new(Algorithm::SHA1, DIGITS, SKEW, STEP, secret).map_err(|_| ParleyError::General)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_seed_validates_its_own_codes() -> Result<()> {
        let seed = generate_seed();
        let code = current_code(&seed)?;
        assert!(verify(&seed, &code)?);
        Ok(())
    }

    #[test]
    fn wrong_code_is_rejected() -> Result<()> {
        let seed = generate_seed();
        assert!(!verify(&seed, "000000")? || !verify(&seed, "999999")?);
        Ok(())
    }

    #[test]
    fn undecodable_seed_is_an_error() {
        assert_eq!(verify("!!not-base32!!", "123456"), Err(ParleyError::General));
    }
}
