//! phpass "portable" hashes (`$P$`, and `$H$` from phpBB), the default
//! WordPress password format since 2.5.

use md5::{Digest, Md5};
use password_hash::{
    errors::{B64Error, InvalidValue},
    Decimal, Error, Ident, McfHasher, Output, ParamsString, PasswordHash,
    PasswordHasher, Salt,
};

const ALGORITHM: Ident<'static> = Ident::new_unwrap("phpass");

const ITOA64: &[u8; 64] = b"./0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// MCF prefixes understood by [`Phpass::upgrade_mcf_hash`].
pub(crate) const PREFIXES: [&str; 2] = ["$P$", "$H$"];

const SALT_LEN: usize = 8;
const DIGEST_LEN: usize = 16;
const ENCODED_DIGEST_LEN: usize = 22;
/// Rounds char + salt + encoded digest.
const MCF_BODY_LEN: usize = 1 + SALT_LEN + ENCODED_DIGEST_LEN;

const MIN_ROUNDS_LOG2: u32 = 7;
const MAX_ROUNDS_LOG2: u32 = 30;
/// What `wp_hash_password` has written since PHP 5 (`$P$B`).
const WORDPRESS_ROUNDS_LOG2: u32 = 13;

/// A well-formed hash nobody can log in with. Verifying against it costs the
/// same as a default WordPress hash.
pub(crate) const EQUALIZER_HASH: &str = "$P$Bequalize......................";

/// phpass parameters
#[derive(Clone, Copy, Debug)]
pub struct Params {
    rounds_log2: u32,
}

impl Params {
    fn checked(rounds_log2: u32) -> Result<Self, Error> {
        if (MIN_ROUNDS_LOG2..=MAX_ROUNDS_LOG2).contains(&rounds_log2) {
            Ok(Self { rounds_log2 })
        } else {
            Err(Error::ParamValueInvalid(InvalidValue::Malformed))
        }
    }
}

impl Default for Params {
    fn default() -> Self {
        Self {
            rounds_log2: WORDPRESS_ROUNDS_LOG2,
        }
    }
}

impl<'a> TryFrom<&'a PasswordHash<'a>> for Params {
    type Error = Error;

    fn try_from(value: &'a PasswordHash<'a>) -> Result<Self, Self::Error> {
        let rounds_log2 = value
            .params
            .get_decimal("r")
            .ok_or(Error::ParamValueInvalid(InvalidValue::Malformed))?;

        Self::checked(rounds_log2)
    }
}

impl TryInto<ParamsString> for Params {
    type Error = Error;

    fn try_into(self) -> Result<ParamsString, Self::Error> {
        let mut string = ParamsString::new();
        string.add_decimal("r", self.rounds_log2)?;
        Ok(string)
    }
}

/// phpass portable hasher
pub struct Phpass;

impl PasswordHasher for Phpass {
    type Params = Params;

    fn hash_password_customized<'a>(
        &self,
        password: &[u8],
        algorithm: Option<Ident<'a>>,
        _version: Option<Decimal>,
        params: Self::Params,
        salt: impl Into<Salt<'a>>,
    ) -> password_hash::Result<PasswordHash<'a>> {
        if algorithm.is_some_and(|algorithm| algorithm != ALGORITHM) {
            return Err(Error::Algorithm);
        }
        let params = Params::checked(params.rounds_log2)?;

        // The salt is used as-is, never decoded.
        let salt = salt.into();
        let salt_bytes = salt.as_str().as_bytes();
        if salt_bytes.len() < SALT_LEN {
            return Err(Error::SaltInvalid(InvalidValue::TooShort));
        }
        if salt_bytes.len() > SALT_LEN {
            return Err(Error::SaltInvalid(InvalidValue::TooLong));
        }

        let digest = stretch(password, salt_bytes, params.rounds_log2);

        Ok(PasswordHash {
            algorithm: ALGORITHM,
            version: None,
            params: params.try_into()?,
            salt: Some(salt),
            hash: Some(Output::new(&digest)?),
        })
    }
}

impl McfHasher for Phpass {
    fn upgrade_mcf_hash<'a>(&self, hash: &'a str) -> password_hash::Result<PasswordHash<'a>> {
        let body = PREFIXES
            .iter()
            .find_map(|prefix| hash.strip_prefix(*prefix))
            .ok_or(Error::Algorithm)?;

        if body.len() != MCF_BODY_LEN || !body.is_ascii() {
            return Err(Error::ParamValueInvalid(InvalidValue::Malformed));
        }

        let (rounds, rest) = body.split_at(1);
        let (salt, encoded) = rest.split_at(SALT_LEN);

        let rounds_log2 = itoa64_index(rounds.as_bytes()[0])
            .ok_or(Error::ParamValueInvalid(InvalidValue::Malformed))?;
        let params = Params::checked(rounds_log2)?;
        let digest = decode64(encoded.as_bytes())?;

        Ok(PasswordHash {
            algorithm: ALGORITHM,
            version: None,
            params: params.try_into()?,
            salt: Some(Salt::from_b64(salt)?),
            hash: Some(Output::new(&digest)?),
        })
    }
}

/// `md5(salt . password)`, then `2^rounds_log2` rounds of `md5(digest . password)`.
fn stretch(password: &[u8], salt: &[u8], rounds_log2: u32) -> [u8; DIGEST_LEN] {
    let mut digest = [0; DIGEST_LEN];
    digest.copy_from_slice(&Md5::new().chain_update(salt).chain_update(password).finalize());

    for _ in 0..(1_u64 << rounds_log2) {
        let next = Md5::new()
            .chain_update(digest)
            .chain_update(password)
            .finalize();
        digest.copy_from_slice(&next);
    }

    digest
}

fn itoa64_index(c: u8) -> Option<u32> {
    ITOA64
        .iter()
        .position(|&candidate| candidate == c)
        .and_then(|index| u32::try_from(index).ok())
}

/// Inverse of phpass `encode64`: little-endian 24 bit groups, 6 bits per char.
fn decode64(encoded: &[u8]) -> Result<[u8; DIGEST_LEN], Error> {
    if encoded.len() != ENCODED_DIGEST_LEN {
        return Err(Error::B64Encoding(B64Error::InvalidLength));
    }

    let mut digest = [0; DIGEST_LEN];
    let mut written = 0;
    for chunk in encoded.chunks(4) {
        let mut group = 0_u32;
        for (position, &c) in chunk.iter().enumerate() {
            let sextet =
                itoa64_index(c).ok_or(Error::B64Encoding(B64Error::InvalidEncoding))?;
            group |= sextet << (6 * position);
        }
        for byte in group.to_le_bytes().iter().take(chunk.len() - 1) {
            digest[written] = *byte;
            written += 1;
        }
    }

    Ok(digest)
}

#[cfg(test)]
mod test {
    use super::{decode64, Phpass, EQUALIZER_HASH, ITOA64};
    use password_hash::{McfHasher, PasswordHash, PasswordHasher, Salt};

    // From the phpass 0.3 distribution's test.php
    const PHPASS_VECTOR: &str = "$P$9IQRaTwmfeRo7ud9Fh4E2PdI0S3r.L0";

    #[test]
    fn phpass_reference_vector() {
        Phpass
            .verify_mcf_hash(b"test12345", PHPASS_VECTOR)
            .unwrap();
        assert!(Phpass.verify_mcf_hash(b"test12346", PHPASS_VECTOR).is_err());
    }

    #[test]
    fn phpbb_prefix_is_the_same_algorithm() {
        let phpbb = PHPASS_VECTOR.replacen("$P$", "$H$", 1);
        Phpass.verify_mcf_hash(b"test12345", &phpbb).unwrap();
    }

    #[test]
    fn upgraded_hash_survives_phc_encoding() {
        let phc = Phpass.upgrade_mcf_hash(PHPASS_VECTOR).unwrap().to_string();
        assert!(phc.starts_with("$phpass$r=11$IQRaTwmf$"));

        let reparsed = PasswordHash::new(&phc).unwrap();
        reparsed.verify_password(&[&Phpass], "test12345").unwrap();
    }

    #[test]
    fn verify_own() {
        let salt = Salt::from_b64("sAlt/.ok").unwrap();
        let own = Phpass.hash_password(b"hunter2", salt).unwrap();
        own.verify_password(&[&Phpass], "hunter2").unwrap();
        assert!(own.verify_password(&[&Phpass], "hunter3").is_err());
    }

    #[test]
    fn rejects_salts_of_the_wrong_size() {
        let salt = Salt::from_b64("exactly8").unwrap();
        assert!(Phpass.hash_password(b"pw", salt).is_ok());

        let salt = Salt::from_b64("short").unwrap();
        assert!(Phpass.hash_password(b"pw", salt).is_err());

        let salt = Salt::from_b64("waytoolongforphpass").unwrap();
        assert!(Phpass.hash_password(b"pw", salt).is_err());
    }

    #[test]
    fn rejects_malformed_strings() {
        for hash in [
            "$P$",
            "$P$9IQRaTwmfeRo7ud9Fh4E2PdI0S3r.L",
            "$P$9IQRaTwmfeRo7ud9Fh4E2PdI0S3r.L0x",
            // 2^5 rounds is below the phpass floor
            "$P$3IQRaTwmfeRo7ud9Fh4E2PdI0S3r.L0",
            "$P$9IQRaTwmfeRo7ud9Fh4E2PdI0S3r.L!",
            "$2y$04$EGdrhbKUv8Oc9vGiXX0HQOxSg445d458Muh7DAHskb6QbtCvdxcie",
        ] {
            assert!(Phpass.upgrade_mcf_hash(hash).is_err(), "{hash}");
        }
    }

    #[test]
    fn decode64_is_little_endian() {
        let mut encoded = [b'.'; 22];
        // 0b000001 in the first sextet sets the lowest bit of the first byte
        encoded[0] = ITOA64[1];
        // the second sextet starts at bit 6
        encoded[1] = ITOA64[4];
        let digest = decode64(&encoded).unwrap();
        assert_eq!(digest[0], 1);
        assert_eq!(digest[1], 1);
        assert!(digest[2..].iter().all(|byte| *byte == 0));
    }

    #[test]
    fn equalizer_hash_is_well_formed() {
        assert_eq!(EQUALIZER_HASH.len(), 34);
        Phpass.upgrade_mcf_hash(EQUALIZER_HASH).unwrap();
    }
}
