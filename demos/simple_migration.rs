use argon2::Argon2;
use password_hash::PasswordHash;
use wp_password_migrate::{legacy::Phpass, native, LegacyScheme, LegacyVerifier, WordPressVerifier};

fn main() {
    // A hash straight out of `wp_users.user_pass`
    let wordpress_hash = "$P$9IQRaTwmfeRo7ud9Fh4E2PdI0S3r.L0";
    let scheme = LegacyScheme::detect(wordpress_hash).expect("not a WordPress hash");
    println!("Legacy hash: {wordpress_hash} ({})", scheme.as_str());

    // The MCF string can be re-encoded as PHC and stored next to native hashes
    let phc = LegacyScheme::upgrade(wordpress_hash).expect("malformed hash");
    println!("As PHC:      {phc}");

    let decoded: PasswordHash<'_> = phc.as_str().try_into().unwrap();
    decoded
        .verify_password(&[&Argon2::default(), &Phpass], b"test12345")
        .unwrap();

    // On first login the gate does the same check and rewrites the credential
    assert!(WordPressVerifier.verify("test12345", wordpress_hash));
    let native = native::hash_password("test12345").unwrap();
    println!("Migrated to: {native}");
    assert!(native::verify_password("test12345", &native));
}
