//! PR state snapshots for the aggregator and triage guard
//!
//! The core crate's decision logic consumes plain values; this module is
//! the one place that talks to the API to assemble them.

use std::collections::HashMap;

use cerberus_core::pr::{PrComment, PullRequestContext};
use serde::Deserialize;
use tracing::{debug, info};

use crate::{Error, GitHubClient, Result};

/// Everything aggregation and triage need to know about a PR
#[derive(Debug, Clone)]
pub struct PrSnapshot {
    pub number: u64,
    pub head_sha: String,
    pub context: PullRequestContext,
    pub comments: Vec<PrComment>,
}

#[derive(Debug, Deserialize)]
struct PermissionResponse {
    permission: String,
}

impl GitHubClient {
    /// Fetch the PR metadata, HEAD sha, and full comment list
    pub async fn pr_snapshot(&self, number: u64) -> Result<PrSnapshot> {
        debug!(number, "Fetching PR snapshot");

        let pr = self
            .client()
            .pulls(self.owner(), self.repo())
            .get(number)
            .await
            .map_err(|e| match &e {
                octocrab::Error::GitHub { source, .. }
                    if source.message.contains("Not Found") =>
                {
                    Error::PrNotFound(number)
                }
                _ => Error::Api(e),
            })?;

        let context = PullRequestContext {
            title: pr.title.clone().unwrap_or_default(),
            author: pr
                .user
                .as_ref()
                .map(|u| u.login.clone())
                .unwrap_or_default(),
            head_branch: pr.head.ref_field.clone(),
            base_branch: pr.base.ref_field.clone(),
            body: pr.body.clone().unwrap_or_default(),
        };
        let head_sha = pr.head.sha.clone();

        let comments = self.list_pr_comments(number).await?;

        info!(
            number,
            head = %head_sha,
            comments = comments.len(),
            "Fetched PR snapshot"
        );

        Ok(PrSnapshot {
            number,
            head_sha,
            context,
            comments,
        })
    }

    /// All issue comments on a PR, oldest first
    pub async fn list_pr_comments(&self, number: u64) -> Result<Vec<PrComment>> {
        let mut comments = Vec::new();
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
                comments.push(PrComment {
                    author: comment.user.login.clone(),
                    body: comment.body.unwrap_or_default(),
                    created_at: Some(comment.created_at),
                    updated_at: comment.updated_at,
                });
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

        Ok(comments)
    }

    /// The collaborator permission level of one user
    /// (`admin`, `maintain`, `write`, `triage`, `read`, or `none`)
    pub async fn collaborator_permission(&self, login: &str) -> Result<String> {
        let route = format!(
            "/repos/{}/{}/collaborators/{}/permission",
            self.owner(),
            self.repo(),
            login
        );
        let response: PermissionResponse = self
            .client()
            .get(route, None::<&()>)
            .await
            .map_err(Error::Api)?;
        Ok(response.permission)
    }

    /// Permission levels for a set of actors, tolerating lookup failures
    ///
    /// An actor whose lookup fails is simply absent from the map, which the
    /// aggregator treats as unpermissioned.
    pub async fn collaborator_permissions(
        &self,
        logins: &[String],
    ) -> HashMap<String, String> {
        let mut permissions = HashMap::new();
        for login in logins {
            match self.collaborator_permission(login).await {
                Ok(permission) => {
                    permissions.insert(login.clone(), permission);
                }
                Err(e) => {
                    debug!(login = %login, error = %e, "Permission lookup failed");
                }
            }
        }
        permissions
    }
}
