//! Emailed verification codes.
//!
//! Each session holds at most one code per [`CodePurpose`]. A code moves from
//! issued to consumed only when both the code and the email it was sent to
//! match what the user submits; a mismatch leaves it issued. Codes have no
//! expiry of their own and live until replaced or until the session ends.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::auth::session::SessionData;

const CODE_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodePurpose {
    Register,
    ResetPassword,
    FindId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingCode {
    pub purpose: CodePurpose,
    pub code: String,
    pub email: String,
    /// Account the code was issued for, when the flow targets one.
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    #[error("No verification code has been requested")]
    NoCode,

    #[error("The verification code or email does not match")]
    Mismatch,
}

/// Generate a 6-digit numeric code; leading zeros are kept.
pub fn generate_code() -> String {
    let n: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{:0width$}", n, width = CODE_LEN)
}

/// Issue a fresh code for `purpose`, replacing any earlier one. Returns the code.
pub fn issue(
    session: &mut SessionData,
    purpose: CodePurpose,
    email: &str,
    username: Option<&str>,
) -> String {
    let code = generate_code();
    session.pending_codes.retain(|p| p.purpose != purpose);
    session.pending_codes.push(PendingCode {
        purpose,
        code: code.clone(),
        email: email.to_string(),
        username: username.map(str::to_string),
    });
    code
}

/// Consume the pending code for `purpose` if `email` and `code` both match
/// verbatim. On mismatch the session is left untouched.
pub fn consume(
    session: &mut SessionData,
    purpose: CodePurpose,
    email: &str,
    code: &str,
) -> Result<PendingCode, VerificationError> {
    let index = session
        .pending_codes
        .iter()
        .position(|p| p.purpose == purpose)
        .ok_or(VerificationError::NoCode)?;

    let pending = &session.pending_codes[index];
    if pending.email != email || pending.code != code {
        tracing::warn!("Verification mismatch for {:?}", purpose);
        return Err(VerificationError::Mismatch);
    }

    Ok(session.pending_codes.remove(index))
}
