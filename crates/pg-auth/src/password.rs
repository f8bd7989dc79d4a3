//! Password hashing for `AuthenticationMD5Password`.

use md5::{Digest, Md5};

/// Hash a password for `AuthenticationMD5Password`.
///
/// The result is `"md5" + hex(md5(hex(md5(password + user)) + salt))`.
#[must_use]
pub fn md5_password(user: &str, password: &str, salt: &[u8; 4]) -> String {
    let mut hasher = Md5::new();
    hasher.update(password.as_bytes());
    hasher.update(user.as_bytes());
    let inner = format!("{:x}", hasher.finalize());

    let mut hasher = Md5::new();
    hasher.update(inner.as_bytes());
    hasher.update(salt);
    format!("md5{:x}", hasher.finalize())
}
