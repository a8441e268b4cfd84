//! Legacy (WordPress) password hashes.
//!
//! WordPress has stored three different formats over the years: unsalted MD5
//! hex digests before 2.5, phpass portable hashes (`$P$`) since, and bcrypt
//! (`$2y$`) on sites running a bcrypt drop-in. All of them are recognised here
//! and verified through [`password_hash`] so digests are compared in constant
//! time.

mod bcrypt;
mod phpass;

pub use self::bcrypt::Bcrypt;
pub use self::phpass::Phpass;

pub(crate) use self::phpass::EQUALIZER_HASH;

use md5::{Digest, Md5};
use password_hash::{Error, McfHasher, Output};

/// Checks a plaintext password against a stored legacy hash.
///
/// Implementations must be deterministic and free of side effects.
pub trait LegacyVerifier: Send + Sync {
    /// Returns `true` if `plaintext` produced `hash`.
    fn verify(&self, plaintext: &str, hash: &str) -> bool;
}

impl<F> LegacyVerifier for F
where
    F: Fn(&str, &str) -> bool + Send + Sync,
{
    fn verify(&self, plaintext: &str, hash: &str) -> bool {
        self(plaintext, hash)
    }
}

/// Hash formats a WordPress install may have left behind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LegacyScheme {
    /// phpass portable hash, `$P$` or `$H$`
    Phpass,
    /// crypt(3) bcrypt, `$2a$`, `$2b$`, `$2x$` or `$2y$`
    Bcrypt,
    /// 32 hex digits of unsalted MD5
    Md5,
}

impl LegacyScheme {
    /// Classifies a stored hash by its shape. Returns `None` for anything
    /// that is not a legacy format.
    #[must_use]
    pub fn detect(hash: &str) -> Option<Self> {
        if phpass::PREFIXES.iter().any(|prefix| hash.starts_with(*prefix)) {
            return Some(Self::Phpass);
        }

        let is_bcrypt = bcrypt::VARIANTS.iter().any(|variant| {
            hash.strip_prefix('$')
                .and_then(|rest| rest.strip_prefix(*variant))
                .is_some_and(|rest| rest.starts_with('$'))
        });
        if is_bcrypt {
            return Some(Self::Bcrypt);
        }

        if hash.len() == 32 && hash.bytes().all(|byte| byte.is_ascii_hexdigit()) {
            return Some(Self::Md5);
        }

        None
    }

    /// Re-encodes a legacy MCF hash as a PHC string.
    ///
    /// Unsalted MD5 digests have no PHC form and yield [`Error::Algorithm`].
    ///
    /// # Errors
    ///
    /// Returns an error if the hash is not a legacy format or is malformed.
    pub fn upgrade(hash: &str) -> password_hash::Result<String> {
        let upgraded = match Self::detect(hash) {
            Some(Self::Phpass) => Phpass.upgrade_mcf_hash(hash)?,
            Some(Self::Bcrypt) => Bcrypt.upgrade_mcf_hash(hash)?,
            Some(Self::Md5) | None => return Err(Error::Algorithm),
        };

        Ok(upgraded.to_string())
    }

    /// Short name used in log fields.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Phpass => "phpass",
            Self::Bcrypt => "bcrypt",
            Self::Md5 => "md5",
        }
    }
}

/// The [`LegacyVerifier`] for every format `wp_check_password` accepts.
#[derive(Clone, Copy, Debug, Default)]
pub struct WordPressVerifier;

impl LegacyVerifier for WordPressVerifier {
    fn verify(&self, plaintext: &str, hash: &str) -> bool {
        let password = plaintext.as_bytes();
        match LegacyScheme::detect(hash) {
            Some(LegacyScheme::Phpass) => Phpass.verify_mcf_hash(password, hash).is_ok(),
            Some(LegacyScheme::Bcrypt) => Bcrypt.verify_mcf_hash(password, hash).is_ok(),
            Some(LegacyScheme::Md5) => md5_matches(password, hash),
            None => false,
        }
    }
}

fn md5_matches(password: &[u8], hex_digest: &str) -> bool {
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };
    let computed = Md5::digest(password);

    match (Output::new(&expected), Output::new(&computed)) {
        (Ok(expected), Ok(computed)) => expected == computed,
        _ => false,
    }
}

#[cfg(test)]
mod test {
    use super::{LegacyScheme, LegacyVerifier, WordPressVerifier};

    const PHPASS: &str = "$P$9IQRaTwmfeRo7ud9Fh4E2PdI0S3r.L0";
    const BCRYPT: &str = "$2y$04$EGdrhbKUv8Oc9vGiXX0HQOxSg445d458Muh7DAHskb6QbtCvdxcie";
    const MD5: &str = "5f4dcc3b5aa765d61d8327deb882cf99";

    #[test]
    fn detects_schemes() {
        assert_eq!(LegacyScheme::detect(PHPASS), Some(LegacyScheme::Phpass));
        assert_eq!(LegacyScheme::detect(BCRYPT), Some(LegacyScheme::Bcrypt));
        assert_eq!(LegacyScheme::detect(MD5), Some(LegacyScheme::Md5));
        assert_eq!(
            LegacyScheme::detect("$argon2id$v=19$m=19456,t=2,p=1$c2FsdA$aGFzaA"),
            None
        );
        assert_eq!(LegacyScheme::detect("$2yy$04$abc"), None);
        assert_eq!(LegacyScheme::detect(""), None);
    }

    #[test]
    fn wordpress_verifier_dispatches_by_scheme() {
        let verifier = WordPressVerifier;
        assert!(verifier.verify("test12345", PHPASS));
        assert!(verifier.verify("correctbatteryhorsestapler", BCRYPT));
        assert!(verifier.verify("password", MD5));
        assert!(verifier.verify("password", &MD5.to_uppercase()));

        assert!(!verifier.verify("password", PHPASS));
        assert!(!verifier.verify("password", BCRYPT));
        assert!(!verifier.verify("Password", MD5));
    }

    #[test]
    fn garbage_never_verifies() {
        let verifier = WordPressVerifier;
        for hash in ["", "$P$short", "$2y$04$", "zz4dcc3b5aa765d61d8327deb882cf99"] {
            assert!(!verifier.verify("password", hash), "{hash}");
        }
    }

    #[test]
    fn upgrade_to_phc() {
        let phc = LegacyScheme::upgrade(BCRYPT).unwrap();
        assert!(phc.starts_with("$bcrypt$r=4$"));
        assert!(LegacyScheme::upgrade(MD5).is_err());
        assert!(LegacyScheme::upgrade("plaintext").is_err());
    }

    #[test]
    fn closures_are_verifiers() {
        let verifier = |plaintext: &str, hash: &str| plaintext == hash;
        assert!(verifier.verify("same", "same"));
        assert!(!LegacyVerifier::verify(&verifier, "one", "other"));
    }
}
