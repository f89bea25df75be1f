use md5::{Digest, Md5};

/// Hash `password` the way the vendor login form expects it.
///
/// Lowercase hex MD5 digest where every `'0'` at an even index is replaced by `'c'`.
pub fn hash_password(password: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(password.as_bytes());
    let digest = format!("{:x}", hasher.finalize());

    digest
        .chars()
        .enumerate()
        .map(|(i, c)| if i % 2 == 0 && c == '0' { 'c' } else { c })
        .collect()
}
