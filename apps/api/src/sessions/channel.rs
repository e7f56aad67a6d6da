//! HTTP-backed interaction channel: a batch of questions waits here until a
//! client posts the answers.

use async_trait::async_trait;
use tokio::sync::{oneshot, RwLock};

use crate::errors::AppError;
use crate::models::problem::UserQuery;
use crate::refinement::broker::{InteractionError, UserInteractionChannel};

type Replies = Result<Vec<Option<String>>, InteractionError>;

struct PendingBatch {
    queries: Vec<UserQuery>,
    responder: oneshot::Sender<Replies>,
}

impl PendingBatch {
    /// False once the broker gave up on the batch (timeout or abort).
    fn is_live(&self) -> bool {
        !self.responder.is_closed()
    }
}

#[derive(Default)]
pub struct SessionChannel {
    pending: RwLock<Option<PendingBatch>>,
}

impl SessionChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Questions of the batch currently waiting for the user.
    pub async fn pending_queries(&self) -> Vec<UserQuery> {
        self.pending
            .read()
            .await
            .as_ref()
            .filter(|batch| batch.is_live())
            .map(|batch| batch.queries.clone())
            .unwrap_or_default()
    }

    /// Answers the waiting batch, one reply per question in order
    /// (`None` declines).
    pub async fn answer(&self, replies: Vec<Option<String>>) -> Result<(), AppError> {
        let mut pending = self.pending.write().await;
        let expected = match pending.as_ref().filter(|batch| batch.is_live()) {
            Some(batch) => batch.queries.len(),
            None => return Err(AppError::Conflict("No questions are waiting for answers".into())),
        };
        if replies.len() != expected {
            return Err(AppError::Validation(format!(
                "Expected {expected} answers, got {}",
                replies.len()
            )));
        }
        if let Some(batch) = pending.take() {
            // The broker may have timed the batch out already.
            let _ = batch.responder.send(Ok(replies));
        }
        Ok(())
    }

    /// Ends the waiting batch with a user abort, if there is one.
    pub async fn abort(&self) {
        if let Some(batch) = self.pending.write().await.take() {
            let _ = batch.responder.send(Err(InteractionError::UserAbort));
        }
    }
}

#[async_trait]
impl UserInteractionChannel for SessionChannel {
    async fn ask(&self, queries: &[UserQuery]) -> Result<Vec<Option<String>>, InteractionError> {
        let (responder, replies) = oneshot::channel();
        *self.pending.write().await = Some(PendingBatch {
            queries: queries.to_vec(),
            responder,
        });
        replies.await.unwrap_or(Err(InteractionError::Closed))
    }
}
