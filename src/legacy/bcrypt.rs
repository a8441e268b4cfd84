//! bcrypt hashes as written by `wp_hash_password` replacements such as
//! `roots/wp-password-bcrypt` (`$2y$`), plus the other `$2?$` variants.

use password_hash::{
    errors::InvalidValue, Decimal, Encoding, Error, Ident, McfHasher, Output, ParamsString,
    PasswordHash, PasswordHasher, Salt,
};
use zeroize::Zeroizing;

const ALGORITHM: Ident<'static> = Ident::new_unwrap("bcrypt");

/// Length of the salt and digest part of an MCF bcrypt string (22 + 31 chars).
const MCF_CONTENT_LEN: usize = 53;

/// Variants of the `$2?$` prefix accepted by [`Bcrypt::upgrade_mcf_hash`].
///
/// All of them are verified as `$2b$`. PHP wrote `$2x$` to flag hashes made by
/// the old sign-extension bug, so a `$2x$` hash only verifies for ASCII
/// passwords; the bug is not reproduced.
pub(crate) const VARIANTS: [&str; 4] = ["2a", "2b", "2x", "2y"];

const MIN_COST: u32 = 4;
const MAX_COST: u32 = 31;

/// bcrypt parameters
#[derive(Clone, Copy, Debug)]
pub struct Params {
    cost: u32,
}

impl Params {
    fn checked(cost: u32) -> Result<Self, Error> {
        if (MIN_COST..=MAX_COST).contains(&cost) {
            Ok(Self { cost })
        } else {
            Err(Error::ParamValueInvalid(InvalidValue::Malformed))
        }
    }
}

impl Default for Params {
    fn default() -> Self {
        Self {
            cost: ::bcrypt::DEFAULT_COST,
        }
    }
}

impl<'a> TryFrom<&'a PasswordHash<'a>> for Params {
    type Error = Error;

    fn try_from(value: &'a PasswordHash<'a>) -> Result<Self, Self::Error> {
        let rounds = value
            .params
            .get_decimal("r")
            .ok_or(Error::ParamValueInvalid(InvalidValue::Malformed))?;

        Self::checked(rounds)
    }
}

impl TryInto<ParamsString> for Params {
    type Error = Error;

    fn try_into(self) -> Result<ParamsString, Self::Error> {
        let mut string = ParamsString::new();
        string.add_decimal("r", self.cost)?;
        Ok(string)
    }
}

/// Legacy bcrypt hasher
pub struct Bcrypt;

impl PasswordHasher for Bcrypt {
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
        let params = Params::checked(params.cost)?;

        let salt = salt.into();
        let mut salt_bytes = [0; 16];

        // Salts coming out of `upgrade_mcf_hash` keep the bcrypt alphabet.
        if Encoding::Bcrypt
            .decode(salt.as_str(), &mut salt_bytes)
            .is_err()
        {
            salt.decode_b64(&mut salt_bytes)?;
        }

        let mut key = Zeroizing::new(Vec::with_capacity(password.len() + 1));
        key.extend_from_slice(password);
        key.push(0);

        // PHP's crypt() only looks at the first 72 bytes
        let truncated = if key.len() > 72 { &key[..72] } else { &key[..] };

        let raw_hash = ::bcrypt::bcrypt(params.cost, salt_bytes, truncated);

        Ok(PasswordHash {
            algorithm: ALGORITHM,
            version: None,
            params: params.try_into()?,
            salt: Some(salt),
            hash: Some(Output::new(&raw_hash[..23])?),
        })
    }
}

impl McfHasher for Bcrypt {
    fn upgrade_mcf_hash<'a>(&self, hash: &'a str) -> password_hash::Result<PasswordHash<'a>> {
        let mut mcf_split = hash.split('$').filter(|part| !part.is_empty());

        let variant = mcf_split.next().ok_or(Error::Algorithm)?;
        if !VARIANTS.iter().any(|known| *known == variant) {
            return Err(Error::Algorithm);
        }

        let cost = mcf_split
            .next()
            .and_then(|cost_str| cost_str.parse::<u32>().ok())
            .ok_or(Error::ParamValueInvalid(InvalidValue::Malformed))?;
        let params = Params::checked(cost)?;

        let mcf_content = mcf_split
            .next()
            .filter(|content| content.len() == MCF_CONTENT_LEN && content.is_ascii())
            .ok_or(Error::ParamValueInvalid(InvalidValue::Malformed))?;
        if mcf_split.next().is_some() {
            return Err(Error::ParamValueInvalid(InvalidValue::Malformed));
        }

        let (b64_salt, b64_hash) = mcf_content.split_at(22);

        let mut raw_hash = [0; 23];
        Encoding::Bcrypt.decode(b64_hash, &mut raw_hash)?;

        Ok(PasswordHash {
            algorithm: ALGORITHM,
            version: None,
            params: params.try_into()?,
            salt: Some(Salt::from_b64(b64_salt)?),
            hash: Some(Output::new(&raw_hash)?),
        })
    }
}

#[cfg(test)]
mod test {
    use super::Bcrypt;
    use password_hash::{McfHasher, PasswordHasher, PasswordVerifier, SaltString};

    #[test]
    fn verify_own() {
        let salt = SaltString::generate(rand::thread_rng());
        let own = Bcrypt.hash_password("test".as_bytes(), &salt).unwrap();
        own.verify_password(&[&Bcrypt], "test").unwrap();
    }

    #[test]
    fn php_2y_prefix() {
        // Same digest as the `$2b$` vector below, re-tagged the way PHP writes it
        let hash = "$2y$04$EGdrhbKUv8Oc9vGiXX0HQOxSg445d458Muh7DAHskb6QbtCvdxcie";
        Bcrypt
            .verify_mcf_hash("correctbatteryhorsestapler".as_bytes(), hash)
            .unwrap();
    }

    #[test]
    fn php_2x_prefix_verifies_ascii_passwords() {
        // For ASCII input the buggy and fixed algorithms agree
        let hash = "$2x$04$EGdrhbKUv8Oc9vGiXX0HQOxSg445d458Muh7DAHskb6QbtCvdxcie";
        Bcrypt
            .verify_mcf_hash("correctbatteryhorsestapler".as_bytes(), hash)
            .unwrap();
    }

    #[test]
    fn python_mcf_test() {
        let hash = "$2b$04$EGdrhbKUv8Oc9vGiXX0HQOxSg445d458Muh7DAHskb6QbtCvdxcie";
        Bcrypt
            .verify_mcf_hash("correctbatteryhorsestapler".as_bytes(), hash)
            .unwrap();
        assert!(Bcrypt
            .verify_mcf_hash("incorrectbatteryhorsestapler".as_bytes(), hash)
            .is_err());
    }

    #[test]
    fn node_mcf_test() {
        let hash = "$2a$04$n4Uy0eSnMfvnESYL.bLwuuj0U/ETSsoTpRT9GVk5bektyVVa5xnIi";
        Bcrypt
            .verify_mcf_hash("correctbatteryhorsestapler".as_bytes(), hash)
            .unwrap();
    }

    #[test]
    fn rejects_truncated_and_foreign_strings() {
        for hash in [
            "$2y$04$EGdrhbKUv8Oc9vGiXX0HQO",
            "$2y$99$EGdrhbKUv8Oc9vGiXX0HQOxSg445d458Muh7DAHskb6QbtCvdxcie",
            "$3$04$EGdrhbKUv8Oc9vGiXX0HQOxSg445d458Muh7DAHskb6QbtCvdxcie",
            "$P$9IQRaTwmfeRo7ud9Fh4E2PdI0S3r.L0",
            "",
        ] {
            assert!(Bcrypt.upgrade_mcf_hash(hash).is_err(), "{hash}");
        }
    }
}
