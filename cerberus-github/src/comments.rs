//! Idempotent PR comment upserts by HTML marker
//!
//! A writer locates an existing comment by marker substring and edits it in
//! place, otherwise creates a new one. Two racing writers may both update;
//! the later write supersedes; consumers assume eventual consistency
//! across retries.

use std::time::Duration;

use octocrab::models::CommentId;
use tracing::{debug, info, warn};

use crate::{Error, GitHubClient, Result};

const MAX_RETRIES: u32 = 3;

fn is_transient(error: &octocrab::Error) -> bool {
    match error {
        octocrab::Error::GitHub { source, .. } => source.status_code.is_server_error(),
        _ => false,
    }
}

fn is_permission_denied(error: &octocrab::Error) -> bool {
    match error {
        octocrab::Error::GitHub { source, .. } => {
            source.status_code.as_u16() == 403
                || source.message.contains("Resource not accessible")
        }
        _ => false,
    }
}

impl GitHubClient {
    /// Find the ID of the first comment containing `marker`
    pub async fn find_comment_by_marker(
        &self,
        number: u64,
        marker: &str,
    ) -> Result<Option<CommentId>> {
        let mut page = self
            .client()
            .issues(self.owner(), self.repo())
            .list_comments(number)
            .per_page(100)
            .send()
            .await
            .map_err(Error::Api)?;

        loop {
            for comment in page.take_items() {
                if comment.body.as_deref().map_or(false, |b| b.contains(marker)) {
                    return Ok(Some(comment.id));
                }
            }
            match self
                .client()
                .get_page::<octocrab::models::issues::Comment>(&page.next)
                .await
                .map_err(Error::Api)?
            {
                Some(next) => page = next,
                None => break,
            }
        }
        Ok(None)
    }

    /// Update the marker-matched comment in place, or create a new one
    ///
    /// Transient 5xx errors are retried with backoff; a 403 surfaces as a
    /// permission error with the workflow fix spelled out.
    pub async fn upsert_comment(&self, number: u64, marker: &str, body: &str) -> Result<()> {
        let existing = self.find_comment_by_marker(number, marker).await?;

        let mut attempt = 0u32;
        loop {
            let result = match existing {
                Some(id) => {
                    debug!(comment_id = %id, "Updating existing marker comment");
                    self.client()
                        .issues(self.owner(), self.repo())
                        .update_comment(id, body)
                        .await
                        .map(|_| ())
                }
                None => {
                    debug!(number, "Creating marker comment");
                    self.client()
                        .issues(self.owner(), self.repo())
                        .create_comment(number, body)
                        .await
                        .map(|_| ())
                }
            };

            match result {
                Ok(()) => break,
                Err(e) if is_permission_denied(&e) => {
                    return Err(Error::Permission(
                        "Unable to post PR comment: token lacks pull-requests: write \
                         permission. Add `pull-requests: write` to the workflow permissions."
                            .to_string(),
                    ));
                }
                Err(e) if is_transient(&e) && attempt + 1 < MAX_RETRIES => {
                    attempt += 1;
                    let delay = Duration::from_secs(1 << attempt);
                    warn!(
                        attempt,
                        max = MAX_RETRIES,
                        delay_secs = delay.as_secs(),
                        error = %e,
                        "Transient GitHub error; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(Error::Api(e)),
            }
        }

        info!(number, marker, "Upserted PR comment");
        Ok(())
    }
}
