//! Chart comment submission
//!
//! Comments are posted to the dashboard's annotations endpoint and the
//! chart's comment list is refreshed afterwards. Drafts are validated
//! locally first so invalid input never reaches the network.

use crate::{Error, Result};
use log::{debug, info};
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Longest accepted comment text, in characters
pub const MAX_COMMENT_CHARS: usize = 500;
/// Longest stored user name, in characters
pub const MAX_USER_CHARS: usize = 100;
/// User recorded when none is given
pub const ANONYMOUS_USER: &str = "Anonymous";

/// A comment as entered in the comment form
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommentDraft {
    pub chart_id: String,
    pub page: String,
    pub text: String,
    pub user: Option<String>,
    pub reason: Option<String>,
    pub exclusion: Option<String>,
    pub why: Option<String>,
    pub quick_fix: Option<String>,
    pub to_do: Option<String>,
}

impl CommentDraft {
    pub fn new(chart_id: impl Into<String>, page: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            chart_id: chart_id.into(),
            page: page.into(),
            text: text.into(),
            ..Default::default()
        }
    }

    /// Normalize the draft and check it the way the server would.
    pub fn validate(mut self) -> Result<Self> {
        self.text = self.text.trim().to_string();
        if self.chart_id.trim().is_empty() || self.page.trim().is_empty() || self.text.is_empty() {
            return Err(Error::InvalidComment(
                "Please fill in all required fields (Chart ID, Page, Comment).".into(),
            ));
        }
        let len = self.text.chars().count();
        if len > MAX_COMMENT_CHARS {
            return Err(Error::InvalidComment(format!(
                "Comment text is too long ({} > {} characters)",
                len, MAX_COMMENT_CHARS
            )));
        }
        let user = self
            .user
            .take()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| ANONYMOUS_USER.to_string());
        self.user = Some(user.chars().take(MAX_USER_CHARS).collect());
        Ok(self)
    }
}

/// A stored comment
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub chart_id: String,
    pub page: String,
    pub text: String,
    pub user: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub exclusion: Option<String>,
    #[serde(default)]
    pub why: Option<String>,
    #[serde(default)]
    pub quick_fix: Option<String>,
    #[serde(default)]
    pub to_do: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Server acknowledgement of a new comment
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommentReceipt {
    #[serde(default)]
    pub message: String,
    pub id: i64,
}

#[derive(Debug)]
pub struct SubmitOutcome {
    pub receipt: CommentReceipt,
    /// The chart's comments after the submission
    pub comments: Vec<Comment>,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// Client for the annotations endpoint
pub struct CommentClient {
    base_url: String,
    http: Client,
}

impl CommentClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, http: Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/annotations", self.base_url)
    }

    /// Validate, submit, and refresh the chart's comment list.
    pub async fn submit(&self, draft: CommentDraft) -> Result<SubmitOutcome> {
        let draft = draft.validate()?;
        debug!("submitting comment for {} on {}", draft.chart_id, draft.page);

        let resp = self.http.post(self.endpoint()).json(&draft).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let reason = resp
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|b| b.error)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
            return Err(Error::NetworkError(format!(
                "Failed to submit comment: {} ({})",
                reason,
                status.as_u16()
            )));
        }
        let receipt: CommentReceipt = resp.json().await?;
        info!("Comment {} added to {}", receipt.id, draft.chart_id);

        let comments = self.fetch_comments(&draft.page, &draft.chart_id).await?;
        Ok(SubmitOutcome { receipt, comments })
    }

    /// Comments stored for one chart on one page
    pub async fn fetch_comments(&self, page: &str, chart_id: &str) -> Result<Vec<Comment>> {
        let resp = self
            .http
            .get(self.endpoint())
            .query(&[("page", page), ("chart_id", chart_id)])
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::NetworkError(format!(
                "Failed to load comments for {}: HTTP {}",
                chart_id, status
            )));
        }
        Ok(resp.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_trims_and_defaults_user() {
        let draft = CommentDraft::new("line-chart", "/fte", "  spike in March  ").validate().unwrap();
        assert_eq!(draft.text, "spike in March");
        assert_eq!(draft.user.as_deref(), Some(ANONYMOUS_USER));
    }

    #[test]
    fn validate_rejects_missing_fields() {
        for draft in [
            CommentDraft::new("", "/", "x"),
            CommentDraft::new("bar-chart", "", "x"),
            CommentDraft::new("bar-chart", "/", "   "),
        ] {
            assert!(matches!(draft.validate(), Err(Error::InvalidComment(_))));
        }
    }

    #[test]
    fn validate_limits_lengths() {
        let ok = CommentDraft::new("c", "/", "é".repeat(MAX_COMMENT_CHARS));
        assert!(ok.validate().is_ok());
        let long = CommentDraft::new("c", "/", "a".repeat(MAX_COMMENT_CHARS + 1));
        assert!(long.validate().is_err());

        let mut named = CommentDraft::new("c", "/", "x");
        named.user = Some("u".repeat(150));
        let named = named.validate().unwrap();
        assert_eq!(named.user.map(|u| u.len()), Some(MAX_USER_CHARS));
    }

    #[test]
    fn draft_serializes_with_form_field_names() {
        let mut draft = CommentDraft::new("area-chart", "/", "ok");
        draft.quick_fix = Some("rerun".into());
        let json = serde_json::to_value(&draft).unwrap();
        assert_eq!(json["chart_id"], "area-chart");
        assert_eq!(json["quick_fix"], "rerun");
        assert!(json["to_do"].is_null());
    }
}
