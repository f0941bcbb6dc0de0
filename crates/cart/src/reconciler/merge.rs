//! Merge-on-login.
//!
//! Device lines are pushed to the account cart one `add_item` call at a
//! time, so quantities for a product already on the account are summed by
//! the backend. Lines the backend accepted are dropped from the device
//! immediately; lines it refused stay behind for the next login. If that
//! device write fails, the reconciler remembers what already arrived and
//! never sends it again.

use std::fmt;

use tracing::{debug, error, info, warn};

use furnish_core::{AccessToken, Cart, ProductId};

use super::{Reconciler, bounded};
use crate::error::ErrorKind;
use crate::local::UnsavedCart;
use crate::remote::{RemoteCart, RemoteError};
use crate::storage::{KeyValueStore, StorageError};

/// A device line the backend refused during a merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeFailure {
    /// Product that was not merged.
    pub product_id: ProductId,
    /// Failure class reported by the backend call.
    pub kind: ErrorKind,
    /// Diagnostic detail, not meant for shoppers.
    pub message: String,
}

/// Outcome of one merge attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Products now on the account cart and removed from the device.
    pub merged: Vec<ProductId>,
    /// Products the backend refused; still on the device.
    pub failed: Vec<MergeFailure>,
    /// Products never attempted because the session expired mid-merge.
    pub skipped: Vec<ProductId>,
    /// Whether the merge stopped early on an expired session.
    pub aborted: bool,
}

impl MergeReport {
    /// True when every device line reached the account cart.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty() && !self.aborted
    }

    /// Number of device lines left behind.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.failed.len() + self.skipped.len()
    }

    /// Product ids still waiting on the device.
    pub fn pending_ids(&self) -> impl Iterator<Item = &ProductId> {
        self.failed
            .iter()
            .map(|failure| &failure.product_id)
            .chain(&self.skipped)
    }
}

impl fmt::Display for MergeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pending = self.pending();
        if pending == 0 {
            return write!(f, "Your cart was merged into your account");
        }
        let noun = if pending == 1 { "item" } else { "items" };
        write!(
            f,
            "{pending} {noun} from this device could not be added to your account cart. \
             They are kept here and will be retried next time you sign in."
        )
    }
}

impl<S: KeyValueStore, R: RemoteCart> Reconciler<S, R> {
    /// Merge the device cart into the account cart and settle the device.
    ///
    /// Nothing is pushed unless the device cart can be rewritten first, so
    /// a read-only device never sends the same lines twice. The second
    /// element is the device write failure, if settling failed.
    pub(super) async fn merge_local_lines(
        &mut self,
        token: &AccessToken,
    ) -> (MergeReport, Result<(), StorageError>) {
        let local = self.local.load();
        if local.is_empty() {
            return (MergeReport::default(), Ok(()));
        }
        if let Err(e) = self.local.save(&local) {
            warn!(error = %e, "Device cart is not writable, postponing merge");
            return (MergeReport::default(), Err(e));
        }

        let report = {
            let _busy = self.busy();
            self.push_local_lines(token, &local).await
        };

        match self.settle_local_lines(&report) {
            Ok(()) => {
                for product_id in &report.merged {
                    self.unsettled.remove(product_id);
                }
                (report, Ok(()))
            }
            Err(unsaved) => {
                error!(
                    error = %unsaved,
                    merged = report.merged.len(),
                    "Failed to drop merged lines from device"
                );
                // The device still holds these lines; remember they arrived
                for product_id in &report.merged {
                    if let Some(line) = local.get(product_id) {
                        self.unsettled
                            .insert(product_id.clone(), line.quantity.get());
                    }
                }
                (report, Err(unsaved.source))
            }
        }
    }

    /// Push every device line to the account cart.
    ///
    /// Units already merged by an earlier attempt whose device write failed
    /// are not sent again. Stops at the first expired-session response,
    /// since every later call would be rejected too. Any other failure is
    /// recorded and the loop moves on to the next line.
    async fn push_local_lines(&self, token: &AccessToken, local: &Cart) -> MergeReport {
        let mut report = MergeReport::default();
        info!(lines = local.len(), "Merging device cart into account cart");

        let mut lines = local.iter();
        for line in lines.by_ref() {
            let product_id = line.product_id();
            let already = self.unsettled.get(product_id).copied().unwrap_or(0);
            let Some(remaining) = line.quantity.get().checked_sub(already).filter(|q| *q > 0)
            else {
                debug!(%product_id, "Line already merged, not sending again");
                report.merged.push(product_id.clone());
                continue;
            };

            let call = self.remote.add_item(token, product_id, remaining);
            match bounded(self.remote_timeout, call).await {
                Ok(()) => report.merged.push(product_id.clone()),
                Err(RemoteError::SessionExpired { status }) => {
                    warn!(%product_id, status, "Session expired during merge");
                    report.aborted = true;
                    report.skipped.push(product_id.clone());
                    break;
                }
                Err(e) => {
                    warn!(%product_id, error = %e, "Failed to merge cart line");
                    report.failed.push(MergeFailure {
                        product_id: product_id.clone(),
                        kind: e.kind(),
                        message: e.to_string(),
                    });
                }
            }
        }
        report
            .skipped
            .extend(lines.map(|line| line.product_id().clone()));

        report
    }

    /// Drop merged lines from the device.
    ///
    /// A complete merge empties the device cart; a partial one removes only
    /// what the backend accepted so a retry never double-counts.
    fn settle_local_lines(&self, report: &MergeReport) -> Result<(), UnsavedCart> {
        if report.merged.is_empty() {
            return Ok(());
        }
        if report.is_complete() {
            self.local.clear().map(drop)
        } else {
            self.local.prune(&report.merged).map(drop)
        }
    }
}
