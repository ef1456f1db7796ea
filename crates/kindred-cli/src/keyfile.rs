//! Identity key files.
//!
//! The file holds the 64-byte `seed ++ public` secret key as one line of hex.

use anyhow::Context;
use kindred_crypto::Identity;
use kindred_crypto::identity::IDENTITY_SECRET_KEY_SIZE;
use std::fs;
use std::path::Path;
use zeroize::Zeroizing;

/// Write `identity` to `path`, readable by the owner only on Unix.
///
/// # Errors
///
/// Returns an error if the file exists and `force` is false, or on I/O failure.
pub fn save(identity: &Identity, path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut contents = Zeroizing::new(hex::encode(identity.to_keypair_bytes().as_slice()));
    contents.push('\n');
    fs::write(path, contents.as_bytes())
        .with_context(|| format!("writing {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }

    Ok(())
}

/// Read an identity from `path`.
///
/// # Errors
///
/// Returns an error if the file is missing or does not hold a valid key.
pub fn load(path: &Path) -> anyhow::Result<Identity> {
    let contents = Zeroizing::new(fs::read_to_string(path).with_context(|| {
        format!(
            "reading identity {} (run `kindred keygen` first)",
            path.display()
        )
    })?);

    let mut bytes = Zeroizing::new([0u8; IDENTITY_SECRET_KEY_SIZE]);
    hex::decode_to_slice(contents.trim(), bytes.as_mut_slice())
        .with_context(|| format!("{} is not a hex identity key", path.display()))?;

    Identity::from_keypair_bytes(&bytes)
        .with_context(|| format!("{} holds an inconsistent keypair", path.display()))
}
