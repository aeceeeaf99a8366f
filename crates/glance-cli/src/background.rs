//! Background preview batches and on-disk locations.
//!
//! [`spawn_preview_batch`] hands every entry of a listing to a blocking
//! worker, holding the final entry back until the others are done. Results
//! come back through an unbounded mpsc channel, one [`PreviewMessage`] per
//! entry, in completion order.

use std::path::PathBuf;
use std::sync::Arc;

use glance_core::{BatchToken, FileIdentity, PreviewService};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

/// Messages sent from preview workers to the caller.
#[derive(Debug)]
pub enum PreviewMessage {
    /// `identity` is the entry at `index` of the submitted listing, with
    /// its preview resolved (or left empty).
    Resolved { index: usize, identity: FileIdentity },
}

/// Returns `~/.config/glance`, or `/.config/glance` without `$HOME`.
pub fn config_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/"))
        .join(".config")
        .join("glance")
}

/// Returns the path to the user's config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Returns the default path to the preview cache file.
pub fn cache_path() -> PathBuf {
    config_dir().join("previews.json")
}

/// Submits `entries` as one new batch and returns its token.
///
/// Every entry but the last is resolved on its own blocking worker. The
/// last entry carries `remaining == 0`, which releases the batch's slot,
/// so it only starts once all of its siblings have finished. A batch
/// submitted later supersedes this one; its unfinished entries then come
/// back unchanged.
pub fn spawn_preview_batch(
    service: Arc<PreviewService>,
    mut entries: Vec<FileIdentity>,
    use_cache: bool,
    tx: UnboundedSender<PreviewMessage>,
) -> BatchToken {
    let token = BatchToken::now();
    tracing::debug!(batch = %token, total = entries.len(), "submitting preview batch");

    let Some(last) = entries.pop() else {
        return token;
    };
    let last_index = entries.len();

    let siblings: Vec<JoinHandle<()>> = entries
        .into_iter()
        .enumerate()
        .map(|(index, identity)| {
            let service = Arc::clone(&service);
            let sender = tx.clone();
            tokio::task::spawn_blocking(move || {
                let identity =
                    service.resolve_preview(identity, token, last_index - index, use_cache);
                send_resolved(&sender, token, index, identity);
            })
        })
        .collect();

    tokio::spawn(async move {
        for sibling in siblings {
            if let Err(e) = sibling.await {
                tracing::warn!(batch = %token, "preview worker failed: {e}");
            }
        }
        let finished = tokio::task::spawn_blocking(move || {
            let identity = service.resolve_preview(last, token, 0, use_cache);
            send_resolved(&tx, token, last_index, identity);
        })
        .await;
        if let Err(e) = finished {
            tracing::warn!(batch = %token, "preview worker failed: {e}");
        }
    });

    token
}

fn send_resolved(
    sender: &UnboundedSender<PreviewMessage>,
    token: BatchToken,
    index: usize,
    identity: FileIdentity,
) {
    if sender
        .send(PreviewMessage::Resolved { index, identity })
        .is_err()
    {
        tracing::debug!(batch = %token, index, "preview result dropped, receiver gone");
    }
}
