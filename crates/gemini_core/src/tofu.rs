//! Trust-On-First-Use certificate pinning.
//!
//! Keyed by `(hostname, port)`, each record holds the pinned fingerprint plus
//! first/last-seen RFC 3339 timestamps. Backed by `sled`, an embedded KV store, rather
//! than SQLite — a logical key/value schema is all that's needed here, and `sled` is
//! the choice the pack's own Titan client (`examples/other_examples/810cfbcb_mkeeter-titan`)
//! makes for the identical job of pinning per-host trust data locally.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fingerprint::fingerprint_der;

#[derive(Debug, Error)]
pub enum TofuError {
    #[error("could not open TOFU database at {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: sled::Error,
    },
    #[error("TOFU database I/O error: {0}")]
    Io(#[from] sled::Error),
    #[error("stored record corrupted for {host}:{port}")]
    Corrupt { host: String, port: u16 },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TofuRecord {
    pub fingerprint: String,
    pub first_seen: String,
    pub last_seen: String,
}

/// Result of checking a freshly observed fingerprint against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TofuOutcome {
    /// No record existed; one was created and trust granted.
    FirstUse,
    /// The observed fingerprint matched the pinned one; `last_seen` was refreshed.
    Matched,
    /// The observed fingerprint differs from the pinned one. Trust is NOT granted and
    /// the record is left untouched; callers must surface `CertificateChanged` and must
    /// never call [`TofuStore::trust`] automatically in response.
    Changed { old: String },
}

fn key(host: &str, port: u16) -> Vec<u8> {
    format!("{host}:{port}").into_bytes()
}

/// A scoped handle to the persistent TOFU store. Acquired at client-session
/// construction and released on teardown ([`TofuStore::close`] or `Drop`), so
/// every exit path leaves the on-disk database closed cleanly.
pub struct TofuStore {
    db: Mutex<Option<sled::Db>>,
}

impl TofuStore {
    pub fn open(path: &Path) -> Result<Self, TofuError> {
        let db = sled::open(path).map_err(|source| TofuError::Open {
            path: path.to_owned(),
            source,
        })?;
        Ok(TofuStore {
            db: Mutex::new(Some(db)),
        })
    }

    /// Opens the default store at `~/.nauyaca/tofu.db`, mirroring the original
    /// implementation's `~/.nauyaca/tofu.db` default (`security/tofu.py`).
    pub fn open_default() -> Result<Self, TofuError> {
        let dirs = directories::ProjectDirs::from("", "", "nauyaca");
        let path = match dirs {
            Some(d) => d.data_dir().join("tofu.db"),
            None => PathBuf::from(".nauyaca/tofu.db"),
        };
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        Self::open(&path)
    }

    fn with_db<T>(&self, f: impl FnOnce(&sled::Db) -> Result<T, TofuError>) -> Result<T, TofuError> {
        let guard = self.db.lock().unwrap();
        let db = guard
            .as_ref()
            .expect("TofuStore used after close");
        f(db)
    }

    fn get_record(db: &sled::Db, host: &str, port: u16) -> Result<Option<TofuRecord>, TofuError> {
        match db.get(key(host, port))? {
            None => Ok(None),
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|_| TofuError::Corrupt {
                    host: host.to_owned(),
                    port,
                }),
        }
    }

    fn put_record(db: &sled::Db, host: &str, port: u16, record: &TofuRecord) -> Result<(), TofuError> {
        let bytes = serde_json::to_vec(record).expect("TofuRecord always serializes");
        db.insert(key(host, port), bytes)?;
        db.flush()?;
        Ok(())
    }

    /// Verify a freshly captured DER certificate against the pinned fingerprint for
    /// `(host, port)`, inserting a first-use record if none exists.
    pub fn verify(&self, host: &str, port: u16, cert_der: &[u8]) -> Result<TofuOutcome, TofuError> {
        let fingerprint = fingerprint_der(cert_der);
        self.with_db(|db| {
            let now = Utc::now().to_rfc3339();
            match Self::get_record(db, host, port)? {
                None => {
                    Self::put_record(
                        db,
                        host,
                        port,
                        &TofuRecord {
                            fingerprint,
                            first_seen: now.clone(),
                            last_seen: now,
                        },
                    )?;
                    Ok(TofuOutcome::FirstUse)
                }
                Some(mut existing) if existing.fingerprint == fingerprint => {
                    existing.last_seen = now;
                    Self::put_record(db, host, port, &existing)?;
                    Ok(TofuOutcome::Matched)
                }
                Some(existing) => Ok(TofuOutcome::Changed {
                    old: existing.fingerprint,
                }),
            }
        })
    }

    /// Explicitly pin a certificate, overwriting any existing record.
    pub fn trust(&self, host: &str, port: u16, cert_der: &[u8]) -> Result<(), TofuError> {
        let fingerprint = fingerprint_der(cert_der);
        self.with_db(|db| {
            let now = Utc::now().to_rfc3339();
            Self::put_record(
                db,
                host,
                port,
                &TofuRecord {
                    fingerprint,
                    first_seen: now.clone(),
                    last_seen: now,
                },
            )
        })
    }

    pub fn revoke(&self, host: &str, port: u16) -> Result<bool, TofuError> {
        self.with_db(|db| Ok(db.remove(key(host, port))?.is_some()))
    }

    pub fn clear(&self) -> Result<usize, TofuError> {
        self.with_db(|db| {
            let n = db.len();
            db.clear()?;
            db.flush()?;
            Ok(n)
        })
    }

    pub fn get_host_info(&self, host: &str, port: u16) -> Result<Option<TofuRecord>, TofuError> {
        self.with_db(|db| Self::get_record(db, host, port))
    }

    pub fn list_hosts(&self) -> Result<Vec<((String, u16), TofuRecord)>, TofuError> {
        self.with_db(|db| {
            let mut out = Vec::new();
            for entry in db.iter() {
                let (k, v) = entry?;
                let key_str = String::from_utf8_lossy(&k);
                let Some((host, port)) = key_str.rsplit_once(':') else {
                    continue;
                };
                let Ok(port) = port.parse::<u16>() else {
                    continue;
                };
                let record: TofuRecord = serde_json::from_slice(&v).map_err(|_| TofuError::Corrupt {
                    host: host.to_owned(),
                    port,
                })?;
                out.push(((host.to_owned(), port), record));
            }
            out.sort_by(|a, b| b.1.last_seen.cmp(&a.1.last_seen));
            Ok(out)
        })
    }

    /// Release the underlying database handle. Idempotent.
    pub fn close(&self) {
        let mut guard = self.db.lock().unwrap();
        if let Some(db) = guard.take() {
            let _ = db.flush();
        }
    }
}

impl Drop for TofuStore {
    fn drop(&mut self) {
        self.close();
    }
}
