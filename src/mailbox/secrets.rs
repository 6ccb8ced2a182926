// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Unguessable token generation.

use base64ct::{Base64UrlUnpadded, Encoding};
use ring::rand::{SecureRandom, SystemRandom};

use super::{MailboxError, MailboxResult};

/// Entropy of recovery token ids and session tokens.
pub const SECRET_BYTES: usize = 32;

/// 32 random bytes, base64url without padding.
pub fn generate_secret() -> MailboxResult<String> {
    let mut bytes = [0u8; SECRET_BYTES];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| MailboxError::Entropy)?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

/// Uniform-ish index in `0..len` for cosmetic choices (generated names).
pub fn random_index(len: usize) -> MailboxResult<usize> {
    if len == 0 {
        return Ok(0);
    }
    let mut bytes = [0u8; 4];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| MailboxError::Entropy)?;
    Ok(u32::from_le_bytes(bytes) as usize % len)
}
