//! Reviewer feedback intake
//!
//! Submissions are validated and logged. There is no backing store yet, so
//! nothing outlives the log line.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::errors::{PortalError, Result};
use crate::schema::Source;
use crate::session::Identity;

const MAX_COMMENT_LEN: usize = 10_000;

#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackSubmission {
    pub source: Source,
    pub tenant_id: String,
    pub assessment_id: String,
    #[serde(default)]
    pub rating: Option<u8>,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedbackReceipt {
    pub id: Uuid,
    pub reviewer: String,
    pub received_at: DateTime<Utc>,
}

/// Validate a submission from `identity` and acknowledge it.
pub fn submit(identity: &Identity, submission: &FeedbackSubmission) -> Result<FeedbackReceipt> {
    if !identity.can_review() {
        return Err(PortalError::InvalidRequest(format!(
            "{} is not allowed to submit feedback",
            identity.name()
        )));
    }
    if submission.tenant_id.trim().is_empty() || submission.assessment_id.trim().is_empty() {
        return Err(PortalError::InvalidRequest(
            "tenant_id and assessment_id are required".to_string(),
        ));
    }
    if submission.rating.is_none() && submission.comment.trim().is_empty() {
        return Err(PortalError::InvalidRequest(
            "feedback needs a rating or a comment".to_string(),
        ));
    }
    if let Some(rating) = submission.rating {
        if !(1..=5).contains(&rating) {
            return Err(PortalError::InvalidRequest(format!(
                "rating must be between 1 and 5, got {}",
                rating
            )));
        }
    }
    if submission.comment.len() > MAX_COMMENT_LEN {
        return Err(PortalError::InvalidRequest("comment is too long".to_string()));
    }

    let receipt = FeedbackReceipt {
        id: Uuid::new_v4(),
        reviewer: identity.name().to_string(),
        received_at: Utc::now(),
    };
    info!(
        feedback_id = %receipt.id,
        reviewer = %receipt.reviewer,
        source = %submission.source,
        tenant = %submission.tenant_id,
        assessment = %submission.assessment_id,
        rating = ?submission.rating,
        comment_len = submission.comment.len(),
        "Feedback received"
    );
    Ok(receipt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Role;

    fn submission(rating: Option<u8>, comment: &str) -> FeedbackSubmission {
        FeedbackSubmission {
            source: Source::Saas,
            tenant_id: "A".to_string(),
            assessment_id: "1".to_string(),
            rating,
            comment: comment.to_string(),
        }
    }

    #[test]
    fn test_reviewer_feedback_is_acknowledged() {
        let reviewer = Identity::new("Dr. Adams", Role::Reviewer);
        let receipt = submit(&reviewer, &submission(Some(4), "plan missed a date")).unwrap();
        assert_eq!(receipt.reviewer, "Dr. Adams");
    }

    #[test]
    fn test_viewers_cannot_submit() {
        let viewer = Identity::new("Viewer", Role::Viewer);
        assert!(submit(&viewer, &submission(Some(4), "")).is_err());
    }

    #[test]
    fn test_empty_or_out_of_range_feedback_rejected() {
        let reviewer = Identity::new("Dr. Adams", Role::Reviewer);
        assert!(submit(&reviewer, &submission(None, "  ")).is_err());
        assert!(submit(&reviewer, &submission(Some(9), "")).is_err());
        assert!(submit(&reviewer, &submission(Some(1), "")).is_ok());
    }

    #[test]
    fn test_submission_deserializes_source_tag() {
        let parsed: FeedbackSubmission = serde_json::from_str(
            r#"{"source":"opas","tenant_id":"T1","assessment_id":"42","comment":"ok"}"#,
        )
        .unwrap();
        assert_eq!(parsed.source, Source::Opas);
        assert_eq!(parsed.rating, None);
    }
}
