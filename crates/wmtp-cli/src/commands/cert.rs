//! Certificate fingerprinting for pinned self-signed servers

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};

use wmtp_core::CertificateFingerprint;

/// Fingerprint of the first certificate in a PEM file
pub fn fingerprint_pem(path: &Path) -> Result<CertificateFingerprint> {
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let mut reader = BufReader::new(file);

    let cert = rustls_pemfile::certs(&mut reader)
        .next()
        .with_context(|| format!("No certificate found in {:?}", path))?
        .with_context(|| format!("Failed to parse {:?}", path))?;

    Ok(CertificateFingerprint::of_der(cert.as_ref()))
}

/// Print the base64 fingerprint to use as `cert_hash`
pub fn hash_cert_command(path: &Path) -> Result<()> {
    let fingerprint = fingerprint_pem(path)?;
    println!("{}", fingerprint.to_base64());
    Ok(())
}
