use rand::Rng;

use crate::error::{AppError, AppResult};

/// Invite code symbols. `I`, `O`, `0` and `1` are left out so codes can be
/// read aloud or copied by hand.
pub const INVITE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const INVITE_CODE_LEN: usize = 6;

/// Uniformly random code. Not unique by construction; the store's unique
/// constraint catches collisions.
pub fn generate_invite_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..INVITE_CODE_LEN)
        .map(|_| INVITE_ALPHABET[rng.gen_range(0..INVITE_ALPHABET.len())] as char)
        .collect()
}

/// Accepts user-entered codes regardless of case or surrounding whitespace.
pub fn normalize_invite_code(raw: &str) -> AppResult<String> {
    let code = raw.trim().to_ascii_uppercase();
    let valid = code.len() == INVITE_CODE_LEN
        && code.bytes().all(|b| INVITE_ALPHABET.contains(&b));
    if !valid {
        return Err(AppError::Validation("Invalid invite code".into()));
    }
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_generated_codes_use_alphabet() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let code = generate_invite_code(&mut rng);
            assert_eq!(code.len(), INVITE_CODE_LEN);
            assert!(code.bytes().all(|b| INVITE_ALPHABET.contains(&b)), "bad code {}", code);
            assert!(normalize_invite_code(&code).is_ok());
        }
    }

    #[test]
    fn test_alphabet_excludes_confusable_symbols() {
        for confusable in [b'I', b'O', b'0', b'1'] {
            assert!(!INVITE_ALPHABET.contains(&confusable));
        }
        assert_eq!(INVITE_ALPHABET.len(), 32);
    }

    #[test]
    fn test_normalize_accepts_lowercase_and_whitespace() {
        assert_eq!(normalize_invite_code("  abc234 ").unwrap(), "ABC234");
    }

    #[test]
    fn test_normalize_rejects_bad_codes() {
        assert!(normalize_invite_code("ABC23").is_err());
        assert!(normalize_invite_code("ABC2345").is_err());
        assert!(normalize_invite_code("ABCDE0").is_err());
        assert!(normalize_invite_code("ABCDEI").is_err());
        assert!(normalize_invite_code("").is_err());
    }
}
