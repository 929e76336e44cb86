//! Host-shell ports for runs without a user interface.
//!
//! The headless agent has nobody to answer a dialog and no device to
//! register for push, so both answers are fixed up front.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::{ConfirmRequest, ConfirmationPrompt, PushTokenProvider};

/// Answers every confirmation the same way.
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirm(pub bool);

#[async_trait]
impl ConfirmationPrompt for AutoConfirm {
    async fn confirm(&self, _request: ConfirmRequest) -> bool {
        self.0
    }
}

/// Push provider with a fixed permission answer and token.
#[derive(Debug, Clone)]
pub struct StaticPushTokens {
    granted: bool,
    token: Option<String>,
}

impl StaticPushTokens {
    pub fn granted(token: impl Into<String>) -> Self {
        Self {
            granted: true,
            token: Some(token.into()),
        }
    }

    pub fn denied() -> Self {
        Self {
            granted: false,
            token: None,
        }
    }
}

#[async_trait]
impl PushTokenProvider for StaticPushTokens {
    async fn request_permission(&self) -> Result<bool, DomainError> {
        Ok(self.granted)
    }

    async fn device_token(&self) -> Result<String, DomainError> {
        self.token
            .clone()
            .filter(|_| self.granted)
            .ok_or_else(|| DomainError::new(ErrorCode::Forbidden, "push permission not granted"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn declining_agent_answers_no_everywhere() {
        let confirm = AutoConfirm(false);
        assert!(!confirm.confirm(ConfirmRequest::new("Delist item?", "")).await);

        let push = StaticPushTokens::denied();
        assert!(!push.request_permission().await.unwrap());
        assert_eq!(
            push.device_token().await.unwrap_err().code,
            ErrorCode::Forbidden
        );
    }

    #[tokio::test]
    async fn granted_push_hands_out_its_token() {
        let push = StaticPushTokens::granted("tok");
        assert!(push.request_permission().await.unwrap());
        assert_eq!(push.device_token().await.unwrap(), "tok");
    }
}
