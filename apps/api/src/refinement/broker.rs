//! Interaction broker — the single serialized consumer of the user channel.
//!
//! Workflows submit one `Escalation` (a batch of questions for their section)
//! at a time over an unbounded FIFO queue. The broker presents batches one by
//! one, in submission order, and replies to each on its oneshot. Every reply
//! is guaranteed: a timeout or a closed channel becomes a decline.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::models::problem::{ProblemId, QueryAnswer, UserQuery};
use crate::models::resume::SectionKind;

#[derive(Debug, Error)]
pub enum InteractionError {
    /// The user asked to stop the whole run.
    #[error("User aborted the run")]
    UserAbort,

    #[error("Interaction channel closed")]
    Closed,
}

/// The presentation side of escalations: CLI prompt, HTTP session, test fake.
#[async_trait]
pub trait UserInteractionChannel: Send + Sync {
    /// Presents one batch and returns one reply per query, in order.
    /// `None` (or a blank reply) declines that query.
    async fn ask(&self, queries: &[UserQuery]) -> Result<Vec<Option<String>>, InteractionError>;
}

#[derive(Debug)]
pub struct Escalation {
    pub section: SectionKind,
    pub queries: Vec<UserQuery>,
    pub reply: oneshot::Sender<Vec<AnsweredQuery>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnsweredQuery {
    pub problem_id: ProblemId,
    pub answer: QueryAnswer,
}

pub struct InteractionBroker {
    channel: Arc<dyn UserInteractionChannel>,
    answer_timeout: Duration,
    abort: CancellationToken,
}

impl InteractionBroker {
    pub fn new(
        channel: Arc<dyn UserInteractionChannel>,
        answer_timeout: Duration,
        abort: CancellationToken,
    ) -> Self {
        Self {
            channel,
            answer_timeout,
            abort,
        }
    }

    pub fn spawn(self, queue: mpsc::UnboundedReceiver<Escalation>) -> JoinHandle<()> {
        tokio::spawn(self.run(queue))
    }

    async fn run(self, mut queue: mpsc::UnboundedReceiver<Escalation>) {
        loop {
            let escalation = tokio::select! {
                _ = self.abort.cancelled() => break,
                next = queue.recv() => match next {
                    Some(escalation) => escalation,
                    None => break,
                },
            };

            if escalation.reply.is_closed() {
                debug!(section = %escalation.section, "skipping questions for finished section");
                continue;
            }

            let asked = tokio::select! {
                _ = self.abort.cancelled() => break,
                asked = tokio::time::timeout(
                    self.answer_timeout,
                    self.channel.ask(&escalation.queries),
                ) => asked,
            };

            let replies = match asked {
                Ok(Ok(replies)) => replies,
                Ok(Err(InteractionError::UserAbort)) => {
                    info!(section = %escalation.section, "user aborted the run");
                    self.abort.cancel();
                    break;
                }
                Ok(Err(InteractionError::Closed)) => {
                    warn!(section = %escalation.section, "interaction channel closed; declining batch");
                    Vec::new()
                }
                Err(_) => {
                    warn!(section = %escalation.section, "no answer within timeout; declining batch");
                    Vec::new()
                }
            };

            let answers = pair_replies(&escalation.queries, replies);
            // The workflow may have been torn down meanwhile.
            let _ = escalation.reply.send(answers);
        }
        debug!("interaction broker stopped");
    }
}

/// Matches replies to queries positionally; missing replies are declines.
fn pair_replies(queries: &[UserQuery], replies: Vec<Option<String>>) -> Vec<AnsweredQuery> {
    let mut replies = replies.into_iter();
    queries
        .iter()
        .map(|query| AnsweredQuery {
            problem_id: query.problem_id,
            answer: QueryAnswer::from_reply(replies.next().flatten()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::problem::{Problem, ProblemCategory, Severity};
    use crate::refinement::testing::ScriptedChannel;

    fn query(description: &str) -> UserQuery {
        let problem = Problem::new(
            SectionKind::Experience,
            description,
            Severity::High,
            ProblemCategory::Missing,
        );
        UserQuery::new(&problem, vec![description.to_string()])
    }

    fn submit(
        queue: &mpsc::UnboundedSender<Escalation>,
        queries: Vec<UserQuery>,
    ) -> oneshot::Receiver<Vec<AnsweredQuery>> {
        let (reply, receiver) = oneshot::channel();
        queue
            .send(Escalation {
                section: SectionKind::Experience,
                queries,
                reply,
            })
            .unwrap();
        receiver
    }

    #[test]
    fn test_missing_replies_are_declines() {
        let queries = vec![query("a"), query("b")];
        let answers = pair_replies(&queries, vec![Some("20%".into())]);
        assert_eq!(answers[0].answer, QueryAnswer::Provided("20%".into()));
        assert_eq!(answers[1].answer, QueryAnswer::Declined);
    }

    #[tokio::test]
    async fn test_batches_are_presented_in_fifo_order() {
        let channel = Arc::new(ScriptedChannel::answering(|q| Some(q.questions[0].clone())));
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = InteractionBroker::new(
            channel.clone(),
            Duration::from_secs(5),
            CancellationToken::new(),
        )
        .spawn(rx);

        let first = submit(&tx, vec![query("first")]);
        let second = submit(&tx, vec![query("second")]);

        assert_eq!(
            first.await.unwrap()[0].answer,
            QueryAnswer::Provided("first".into())
        );
        assert_eq!(
            second.await.unwrap()[0].answer,
            QueryAnswer::Provided("second".into())
        );
        let asked: Vec<String> = channel
            .asked()
            .iter()
            .map(|q| q.questions[0].clone())
            .collect();
        assert_eq!(asked, vec!["first", "second"]);

        drop(tx);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_reply_is_skipped() {
        let channel = Arc::new(ScriptedChannel::answering(|_| Some("x".into())));
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = InteractionBroker::new(
            channel.clone(),
            Duration::from_secs(5),
            CancellationToken::new(),
        )
        .spawn(rx);

        drop(submit(&tx, vec![query("gone")]));
        let live = submit(&tx, vec![query("live")]);
        live.await.unwrap();

        assert_eq!(channel.asked().len(), 1);
        drop(tx);
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_declines_batch() {
        let channel = Arc::new(ScriptedChannel::silent());
        let (tx, rx) = mpsc::unbounded_channel();
        let _handle = InteractionBroker::new(
            channel,
            Duration::from_secs(30),
            CancellationToken::new(),
        )
        .spawn(rx);

        let answers = submit(&tx, vec![query("slow")]).await.unwrap();
        assert_eq!(answers[0].answer, QueryAnswer::Declined);
    }

    #[tokio::test]
    async fn test_user_abort_cancels_run() {
        let abort = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = InteractionBroker::new(
            Arc::new(ScriptedChannel::aborting()),
            Duration::from_secs(5),
            abort.clone(),
        )
        .spawn(rx);

        let reply = submit(&tx, vec![query("q")]);
        handle.await.unwrap();

        assert!(abort.is_cancelled());
        assert!(reply.await.is_err(), "no answers are sent after an abort");
    }
}
