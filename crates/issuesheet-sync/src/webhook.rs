//! GitHub `issues` / `issue_comment` webhook payloads and signatures.

use hmac::{Hmac, Mac};
use issuesheet_core::WebhookError;
use issuesheet_services::Issue;
use serde::Deserialize;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_PREFIX: &str = "sha256=";

/// The `action` of a delivery. Unknown actions deserialize to `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueAction {
    Opened,
    Reopened,
    Closed,
    Created,
    Labeled,
    Unlabeled,
    Assigned,
    Unassigned,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentPayload {
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    pub action: IssueAction,
    pub issue: Issue,
    /// Present on `issue_comment` deliveries
    #[serde(default)]
    pub comment: Option<CommentPayload>,
}

impl WebhookPayload {
    pub fn from_slice(body: &[u8]) -> Result<Self, WebhookError> {
        serde_json::from_slice(body).map_err(|e| WebhookError::MalformedPayload(e.to_string()))
    }

    pub fn comment_body(&self) -> Option<&str> {
        self.comment.as_ref().and_then(|c| c.body.as_deref())
    }
}

fn keyed_mac(secret: &str, body: &[u8]) -> Result<HmacSha256, WebhookError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| WebhookError::InvalidSignature)?;
    mac.update(body);
    Ok(mac)
}

/// `sha256=<hex>` HMAC of `body`, as sent in `X-Hub-Signature-256`.
pub fn compute_signature(secret: &str, body: &[u8]) -> Result<String, WebhookError> {
    let digest = keyed_mac(secret, body)?.finalize().into_bytes();
    Ok(format!("{}{}", SIGNATURE_PREFIX, hex::encode(digest)))
}

/// Check a delivery's `X-Hub-Signature-256` header in constant time.
pub fn verify_signature(secret: &str, body: &[u8], header: Option<&str>) -> Result<(), WebhookError> {
    let header = header.ok_or(WebhookError::MissingSignature)?;
    let digest = header
        .trim()
        .strip_prefix(SIGNATURE_PREFIX)
        .and_then(|hex_digest| hex::decode(hex_digest).ok())
        .ok_or(WebhookError::InvalidSignature)?;

    keyed_mac(secret, body)?
        .verify_slice(&digest)
        .map_err(|_| WebhookError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_known_signature() {
        // Example from GitHub's webhook validation docs
        assert_eq!(
            compute_signature("It's a Secret to Everybody", b"Hello, World!").unwrap(),
            "sha256=757107ea0eb2509fc211221cce984b8a37570b6d7586c22c46f4379c8b043e17"
        );
    }

    #[test]
    fn test_verify_round_trip() {
        let body = br#"{"action":"opened"}"#;
        let signature = compute_signature("s3cret", body).unwrap();
        assert!(verify_signature("s3cret", body, Some(&signature)).is_ok());
    }

    #[test]
    fn test_verify_rejects_tampering() {
        let signature = compute_signature("s3cret", b"original").unwrap();
        assert!(matches!(
            verify_signature("s3cret", b"tampered", Some(&signature)),
            Err(WebhookError::InvalidSignature)
        ));
        assert!(matches!(
            verify_signature("other", b"original", Some(&signature)),
            Err(WebhookError::InvalidSignature)
        ));
    }

    #[test]
    fn test_verify_rejects_bad_headers() {
        assert!(matches!(
            verify_signature("s", b"x", None),
            Err(WebhookError::MissingSignature)
        ));
        assert!(matches!(
            verify_signature("s", b"x", Some("sha1=abcd")),
            Err(WebhookError::InvalidSignature)
        ));
        assert!(matches!(
            verify_signature("s", b"x", Some("sha256=not-hex")),
            Err(WebhookError::InvalidSignature)
        ));
    }

    #[test]
    fn test_parse_issues_delivery() {
        let body = br#"{
            "action": "labeled",
            "issue": {
                "number": 12,
                "title": "Crash",
                "html_url": "https://github.com/o/r/issues/12",
                "labels": [{"name": "bug"}],
                "assignees": []
            },
            "label": {"name": "bug"}
        }"#;
        let payload = WebhookPayload::from_slice(body).unwrap();
        assert_eq!(payload.action, IssueAction::Labeled);
        assert_eq!(payload.issue.number, 12);
        assert_eq!(payload.comment_body(), None);
    }

    #[test]
    fn test_parse_comment_delivery() {
        let body = br#"{
            "action": "created",
            "issue": {"number": 3, "title": "t", "html_url": "u"},
            "comment": {"id": 1, "body": "looks good"}
        }"#;
        let payload = WebhookPayload::from_slice(body).unwrap();
        assert_eq!(payload.action, IssueAction::Created);
        assert_eq!(payload.comment_body(), Some("looks good"));
    }

    #[test]
    fn test_unknown_action_is_other() {
        let body = br#"{"action": "milestoned", "issue": {"number": 1, "title": "t", "html_url": "u"}}"#;
        assert_eq!(WebhookPayload::from_slice(body).unwrap().action, IssueAction::Other);
    }

    #[test]
    fn test_malformed_payload() {
        assert!(matches!(
            WebhookPayload::from_slice(b"{not json"),
            Err(WebhookError::MalformedPayload(_))
        ));
        assert!(matches!(
            WebhookPayload::from_slice(br#"{"action": "opened"}"#),
            Err(WebhookError::MalformedPayload(_))
        ));
    }
}
