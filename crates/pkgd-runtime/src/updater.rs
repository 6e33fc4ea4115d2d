//! The per-catalog updater (§4.I): polls `LATEST.jwt`/`LATEST.txt` on an
//! hourly tick or a manual trigger, downloads a delta-or-full snapshot, and
//! calls [`pkgd_catalog::Catalog::index`] to apply it atomically.
//!
//! Grounded in `original_source/apkgdb/update.go`'s `download`/`update`/
//! `updateThread` (the `LATEST.txt` GET, the `current-new.bin` /
//! `new.bin` pair, the temp-file-then-index dance, the hourly
//! `time.Ticker` plus a manual-trigger channel) generalized to also try
//! the signed `LATEST.jwt` pointer first, per spec.md §4.C/§4.I.

use std::sync::Arc;
use std::time::Duration;

use pkgd_catalog::Catalog;
use pkgd_fskit::{CancellationToken, KernelNotifier, ROOT_INO, cancelable};
use pkgd_format::{LegacyLatest, parse_legacy_latest, verify_latest_jwt_against};
use tokio::sync::Notify;

use crate::error::RuntimeError;

/// §5: "1 hour updater tick".
pub const TICK_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// What one `check_once` call found and did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The remote catalog has no published version yet (`LATEST` body `NEW`).
    NotYetPublished,
    /// The remote version matches what's already indexed; nothing to do.
    UpToDate { version: String },
    /// A new version was fetched, verified, and indexed.
    Updated { from: Option<String>, to: String },
}

/// Drives one catalog's `LATEST` polling loop. One instance per catalog
/// (including sub-catalogs, each with their own updater spawned by
/// whoever owns the sub-catalog's lifetime — this crate does not itself
/// walk `Catalog::list_subs`).
pub struct Updater {
    catalog: Arc<Catalog>,
    client: reqwest::Client,
    prefix: String,
    trust: pkgd_crypto::TrustTable,
    notifier: Arc<dyn KernelNotifier>,
    manual: Notify,
    /// §5: fired by the daemon at shutdown. `run`'s loop exits on it, and
    /// every fetch `check_once` performs races against it so a check in
    /// flight when it fires aborts before `Catalog::index` ever runs.
    cancel: CancellationToken,
}

impl Updater {
    pub fn new(
        catalog: Arc<Catalog>,
        client: reqwest::Client,
        prefix: impl Into<String>,
        trust: pkgd_crypto::TrustTable,
        notifier: Arc<dyn KernelNotifier>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            catalog,
            client,
            prefix: prefix.into(),
            trust,
            notifier,
            manual: Notify::new(),
            cancel,
        }
    }

    /// Wakes a pending [`run`](Self::run) loop to check immediately,
    /// mirroring the original's `d.upd <- struct{}{}` manual-trigger send.
    pub fn trigger(&self) {
        self.manual.notify_one();
    }

    /// Runs until the catalog has never been indexed (an immediate first
    /// check), then alternates between the hourly tick and a manual
    /// trigger (§4.I) until `cancel` fires.
    pub async fn run(&self) {
        if self.catalog.current_version().is_none() {
            self.log_outcome(self.check_once().await);
        }

        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        ticker.tick().await; // first tick fires immediately; already handled above
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.manual.notified() => {}
                _ = self.cancel.cancelled() => {
                    tracing::info!(catalog = self.catalog.name(), "updater loop cancelled, exiting");
                    return;
                }
            }
            self.log_outcome(self.check_once().await);
        }
    }

    fn log_outcome(&self, result: Result<UpdateOutcome, RuntimeError>) {
        match result {
            Ok(UpdateOutcome::Updated { from, to }) => {
                tracing::info!(catalog = self.catalog.name(), from = ?from, to, "catalog updated");
            }
            Ok(outcome) => {
                tracing::debug!(catalog = self.catalog.name(), ?outcome, "update check: no change");
            }
            Err(err) => {
                tracing::warn!(catalog = self.catalog.name(), error = %err, "update check failed");
            }
        }
    }

    /// One full check: fetch `LATEST`, compare against the current
    /// version, and if different, download and index the new snapshot.
    ///
    /// §5: both network phases race against `self.cancel`; cancellation
    /// can only surface before `Catalog::index` runs, never during or
    /// after it, so a cancelled check never leaves a half-applied update.
    pub async fn check_once(&self) -> Result<UpdateOutcome, RuntimeError> {
        let target = cancelable(&self.cancel, self.fetch_latest())
            .await
            .map_err(RuntimeError::from)??;
        let remote_version = match target {
            LatestTarget::New => return Ok(UpdateOutcome::NotYetPublished),
            LatestTarget::Version(v) => v,
        };

        let current = self.catalog.current_version();
        if current.as_deref() == Some(remote_version.as_str()) {
            return Ok(UpdateOutcome::UpToDate {
                version: remote_version,
            });
        }

        let bytes = cancelable(
            &self.cancel,
            self.download_snapshot(current.as_deref(), &remote_version),
        )
        .await
        .map_err(RuntimeError::from)??;
        self.catalog.index(&bytes, &self.trust)?;

        self.notifier.notify_inode(ROOT_INO, 0, remote_version.as_bytes());

        Ok(UpdateOutcome::Updated {
            from: current,
            to: remote_version,
        })
    }

    fn catalog_url_base(&self) -> String {
        format!(
            "{}db/{}/{}/{}/",
            self.prefix,
            self.catalog.name(),
            self.catalog.os(),
            self.catalog.arch()
        )
    }

    /// Tries the signed `LATEST.jwt` pointer first, falling back to the
    /// legacy plain-text `LATEST.txt` if the JWT endpoint is unavailable.
    async fn fetch_latest(&self) -> Result<LatestTarget, RuntimeError> {
        let base = self.catalog_url_base();

        let jwt_resp = self.client.get(format!("{base}LATEST.jwt")).send().await;
        if let Ok(resp) = jwt_resp {
            if resp.status().is_success() {
                let token = resp.text().await?;
                let pointer = verify_latest_jwt_against(token.trim(), &self.trust)?;
                tracing::debug!(signer = pointer.signer_name, "verified LATEST.jwt");
                return Ok(LatestTarget::Version(pointer.claims.ver));
            }
        }

        let txt_resp = self.client.get(format!("{base}LATEST.txt")).send().await?;
        if !txt_resp.status().is_success() {
            return Err(RuntimeError::NoLatestPointer);
        }
        let body = txt_resp.text().await?;
        match parse_legacy_latest(&body) {
            LegacyLatest::New => Ok(LatestTarget::New),
            LegacyLatest::Stamp(stamp) => Ok(LatestTarget::Version(stamp)),
        }
    }

    /// Attempts `{old}-{new}.bin` (a delta) when a current version exists;
    /// falls back to the full `{new}.bin` snapshot on any non-success
    /// status, exactly mirroring the original's delta-then-full sequence.
    async fn download_snapshot(
        &self,
        current: Option<&str>,
        target: &str,
    ) -> Result<Vec<u8>, RuntimeError> {
        let base = self.catalog_url_base();

        if let Some(current) = current {
            let delta_url = format!("{base}{current}-{target}.bin");
            let resp = self.client.get(&delta_url).send().await?;
            if resp.status().is_success() {
                tracing::debug!(url = delta_url, "downloading delta catalog snapshot");
                return Ok(resp.bytes().await?.to_vec());
            }
        }

        let full_url = format!("{base}{target}.bin");
        let resp = self.client.get(&full_url).send().await?;
        if !resp.status().is_success() {
            return Err(RuntimeError::BadStatus(resp.status()));
        }
        tracing::debug!(url = full_url, "downloading full catalog snapshot");
        Ok(resp.bytes().await?.to_vec())
    }
}

enum LatestTarget {
    New,
    Version(String),
}
