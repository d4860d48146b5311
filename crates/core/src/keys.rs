//! Short unique record keys
//!
//! Keys are drawn from uppercase letters and digits and checked against the
//! store through a caller-supplied predicate.

use rand::Rng;

use crate::error::{Error, Result};

/// Default key length
pub const KEY_LENGTH: usize = 10;

/// Default number of draws before giving up
pub const KEY_ATTEMPTS: u32 = 10;

const KEY_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Draw a random key of `length` characters
pub fn random_key(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| KEY_CHARSET[rng.gen_range(0..KEY_CHARSET.len())] as char)
        .collect()
}

/// Draw keys until `exists` reports one unused, up to `attempts` draws
pub fn generate_unique_key<F>(length: usize, attempts: u32, mut exists: F) -> Result<String>
where
    F: FnMut(&str) -> Result<bool>,
{
    for _ in 0..attempts {
        let key = random_key(length);
        if !exists(&key)? {
            return Ok(key);
        }
        tracing::debug!(key = %key, "Key collision, drawing again");
    }
    Err(Error::KeyExhausted { attempts })
}
