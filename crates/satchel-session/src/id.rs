//! Session ID generation.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::TryRngCore;
use rand::rngs::OsRng;

use crate::error::{Error, Result};

/// Number of random bytes in a session ID.
pub const SESSION_ID_BYTES: usize = 32;

/// Generate a new session ID.
///
/// 32 bytes from the operating system's CSPRNG, encoded as URL-safe
/// base64 without padding so the token can be used verbatim as a cookie
/// value.
pub fn generate_session_id() -> Result<String> {
    let mut bytes = [0u8; SESSION_ID_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| Error::IdGeneration(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}
