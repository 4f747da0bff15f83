// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! TLS certificate management — pure Rust, no OpenSSL.
//!
//! Certificates are ECDSA P-256, valid 90 days, regenerated within 7 days of
//! expiry. `insecure_dev_mode` in [`crate::config::HttpConfig`] skips this
//! entirely and serves plain HTTP, for local development only.

use std::path::{Path, PathBuf};

use anyhow::Context;
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use rustls_pemfile::certs;
use time::{Duration, OffsetDateTime};
use tracing::info;

const CERT_VALIDITY_DAYS: i64 = 90;
const CERT_RENEW_BEFORE_DAYS: i64 = 7;

pub struct TlsRuntime {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub fingerprint_sha256: String,
}

pub fn load_or_generate(cert_dir: &Path) -> anyhow::Result<TlsRuntime> {
    let cert_path = cert_dir.join("gateway-cert.pem");
    let key_path = cert_dir.join("gateway-key.pem");

    let needs_generate =
        !cert_path.exists() || !key_path.exists() || cert_is_expiring_soon(&cert_path);

    if needs_generate {
        generate_self_signed(cert_dir, &cert_path, &key_path)?;
    }

    load_from_files(&cert_path, &key_path)
}

fn generate_self_signed(cert_dir: &Path, cert_path: &Path, key_path: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(cert_dir)
        .with_context(|| format!("creating TLS cert dir {}", cert_dir.display()))?;

    let key_pair = KeyPair::generate().context("generating ECDSA P-256 key pair")?;

    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, "sven-gateway");

    let now = OffsetDateTime::now_utc();
    let mut params = CertificateParams::new(vec![
        "sven-gateway".to_string(),
        "localhost".to_string(),
        "127.0.0.1".to_string(),
    ])
    .context("building cert params")?;
    params.not_before = now;
    params.not_after = now + Duration::days(CERT_VALIDITY_DAYS);
    params.distinguished_name = dn;

    let cert = params
        .self_signed(&key_pair)
        .context("generating self-signed certificate")?;

    std::fs::write(cert_path, cert.pem())
        .with_context(|| format!("writing {}", cert_path.display()))?;
    write_secret(key_path, key_pair.serialize_pem().as_bytes())?;

    info!(
        cert = %cert_path.display(),
        key  = %key_path.display(),
        "generated ECDSA P-256 self-signed certificate (90-day validity)",
    );

    Ok(())
}

fn load_from_files(cert_path: &Path, key_path: &Path) -> anyhow::Result<TlsRuntime> {
    let cert_pem =
        std::fs::read(cert_path).with_context(|| format!("reading {}", cert_path.display()))?;

    let fingerprint_sha256 = {
        use sha2::{Digest, Sha256};
        let mut reader = std::io::Cursor::new(&cert_pem);
        let first_cert = certs(&mut reader)
            .next()
            .ok_or_else(|| anyhow::anyhow!("no certificate found in {}", cert_path.display()))?
            .context("parsing certificate")?;
        Sha256::digest(&first_cert)
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join(":")
    };

    info!(fingerprint = %fingerprint_sha256, "loaded TLS certificate");

    Ok(TlsRuntime {
        cert_path: cert_path.to_path_buf(),
        key_path: key_path.to_path_buf(),
        fingerprint_sha256,
    })
}

fn cert_is_expiring_soon(cert_path: &Path) -> bool {
    let Ok(meta) = std::fs::metadata(cert_path) else {
        return true;
    };
    let Ok(modified) = meta.modified() else {
        return true;
    };
    let age_days = modified.elapsed().unwrap_or_default().as_secs() as i64 / 86400;
    age_days >= (CERT_VALIDITY_DAYS - CERT_RENEW_BEFORE_DAYS)
}

fn write_secret(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        let mut f = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .with_context(|| format!("writing {}", path.display()))?;
        f.write_all(data)?;
    }
    #[cfg(not(unix))]
    {
        std::fs::write(path, data).with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(())
}

pub fn default_cert_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sven")
        .join("gateway")
        .join("tls")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_cert_and_loads_it() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = load_or_generate(dir.path()).unwrap();
        assert!(!runtime.fingerprint_sha256.is_empty());
        assert!(runtime.fingerprint_sha256.contains(':'));
    }

    #[test]
    fn second_load_reuses_existing_cert() {
        let dir = tempfile::tempdir().unwrap();
        let r1 = load_or_generate(dir.path()).unwrap();
        let r2 = load_or_generate(dir.path()).unwrap();
        assert_eq!(r1.fingerprint_sha256, r2.fingerprint_sha256);
    }
}
