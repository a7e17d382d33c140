use pbkdf2::pbkdf2_hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

const PBKDF2_ITERATIONS: u32 = 100_000;
const SALT_LEN: usize = 16;
const KEY_LEN: usize = 32;

/// Derive a salted PBKDF2-HMAC-SHA256 hash, serialized as
/// `pbkdf2$<iterations>$<salt hex>$<key hex>`.
pub fn hash_password(plain: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);

    let mut key = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(plain.as_bytes(), &salt, PBKDF2_ITERATIONS, &mut key);

    format!(
        "pbkdf2${}${}${}",
        PBKDF2_ITERATIONS,
        hex::encode(salt),
        hex::encode(key)
    )
}

/// Check a password against a stored hash string. Fails closed on any
/// malformed input, including the `oauth:<provider>` sentinel hashes.
/// The final comparison is constant-time.
pub fn verify_password(plain: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some(algorithm), Some(iterations_raw), Some(salt_hex), Some(key_hex), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };

    if algorithm != "pbkdf2" {
        return false;
    }
    let Ok(iterations) = iterations_raw.parse::<u32>() else {
        return false;
    };
    if iterations == 0 {
        return false;
    }
    let Ok(salt) = hex::decode(salt_hex) else {
        return false;
    };
    let Ok(expected) = hex::decode(key_hex) else {
        return false;
    };
    if expected.is_empty() {
        return false;
    }

    let mut derived = vec![0u8; expected.len()];
    pbkdf2_hmac::<Sha256>(plain.as_bytes(), &salt, iterations, &mut derived);
    bool::from(derived.as_slice().ct_eq(expected.as_slice()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let password = "Secur3P@ssw0rd!";
        let hash = hash_password(password);
        assert!(verify_password(password, &hash));
    }

    #[test]
    fn verify_rejects_wrong_password() {
        let hash = hash_password("correct-horse-battery-staple");
        assert!(!verify_password("wrong-password", &hash));
    }

    #[test]
    fn hashing_twice_salts_differently_and_both_verify() {
        let password = "same-password";
        let a = hash_password(password);
        let b = hash_password(password);
        assert_ne!(a, b);
        assert!(verify_password(password, &a));
        assert!(verify_password(password, &b));
    }

    #[test]
    fn hash_format_fields() {
        let hash = hash_password("anything");
        let parts: Vec<&str> = hash.split('$').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "pbkdf2");
        assert_eq!(parts[1], "100000");
        assert_eq!(parts[2].len(), SALT_LEN * 2);
        assert_eq!(parts[3].len(), KEY_LEN * 2);
    }

    #[test]
    fn verify_fails_closed_on_malformed_input() {
        assert!(!verify_password("x", ""));
        assert!(!verify_password("x", "not-a-hash"));
        assert!(!verify_password("x", "bcrypt$1000$aa$bb"));
        assert!(!verify_password("x", "pbkdf2$0$aabb$ccdd"));
        assert!(!verify_password("x", "pbkdf2$-5$aabb$ccdd"));
        assert!(!verify_password("x", "pbkdf2$1000$zzzz$ccdd"));
        assert!(!verify_password("x", "pbkdf2$1000$aabb$zzzz"));
        assert!(!verify_password("x", "pbkdf2$1000$aabb$ccdd$extra"));
        assert!(!verify_password("x", "pbkdf2$1000$aabb$"));
    }

    #[test]
    fn oauth_sentinel_never_verifies() {
        assert!(!verify_password("anything", "oauth:github"));
        assert!(!verify_password("oauth:github", "oauth:github"));
    }
}
