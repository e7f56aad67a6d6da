//! Scripted collaborators for refinement tests.

use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::assessment::{Assessment, QualityAssessor};
use crate::errors::RefineError;
use crate::generation::generator::apply_answer;
use crate::generation::{ContentGenerator, FixRequest, GenerationError};
use crate::models::job::JobRequirement;
use crate::models::problem::{Problem, ProblemCategory, Severity, UserQuery};
use crate::models::resume::SectionKind;
use crate::refinement::broker::{InteractionError, UserInteractionChannel};

#[derive(Debug, Clone)]
pub enum Scripted {
    Content(String),
    Timeout,
    Reject,
    /// Never returns; the caller's timeout or abort has to end it.
    Hang,
}

/// Plays back a script for calls without a user answer. Calls carrying an
/// answer apply it verbatim.
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Scripted>>,
    repeat: Option<Scripted>,
    calls: Mutex<u32>,
    rejected_seen: Mutex<Vec<Vec<String>>>,
    answers_seen: Mutex<Vec<String>>,
    in_flight: Arc<Notify>,
}

impl ScriptedGenerator {
    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            repeat: None,
            calls: Mutex::new(0),
            rejected_seen: Mutex::new(Vec::new()),
            answers_seen: Mutex::new(Vec::new()),
            in_flight: Arc::new(Notify::new()),
        }
    }

    pub fn repeating(step: Scripted) -> Self {
        Self {
            repeat: Some(step),
            ..Self::new(Vec::new())
        }
    }

    /// Calls made without a user answer.
    pub fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }

    pub fn rejected_seen(&self) -> Vec<Vec<String>> {
        self.rejected_seen.lock().unwrap().clone()
    }

    pub fn answers_seen(&self) -> Vec<String> {
        self.answers_seen.lock().unwrap().clone()
    }

    /// Notified when a `Hang` step starts.
    pub fn in_flight(&self) -> Arc<Notify> {
        self.in_flight.clone()
    }
}

#[async_trait]
impl ContentGenerator for ScriptedGenerator {
    async fn suggest_fix(&self, request: &FixRequest<'_>) -> Result<String, GenerationError> {
        if let Some(answer) = request.user_answer {
            self.answers_seen.lock().unwrap().push(answer.to_string());
            return Ok(apply_answer(request.content, request.problem, answer));
        }

        *self.calls.lock().unwrap() += 1;
        self.rejected_seen
            .lock()
            .unwrap()
            .push(request.prior_rejected.to_vec());

        let step = {
            let mut script = self.script.lock().unwrap();
            script.pop_front().or_else(|| self.repeat.clone())
        };
        match step {
            Some(Scripted::Content(content)) => Ok(content),
            Some(Scripted::Timeout) => Err(GenerationError::Timeout),
            Some(Scripted::Reject) | None => Err(GenerationError::Rejected("script exhausted".into())),
            Some(Scripted::Hang) => {
                self.in_flight.notify_one();
                std::future::pending::<()>().await;
                Err(GenerationError::Timeout)
            }
        }
    }
}

struct Rule {
    description: &'static str,
    category: ProblemCategory,
    severity: Severity,
    present: fn(&str) -> bool,
}

/// Assessor with a fixed rule set, independent of section kind.
pub struct ScriptedAssessor {
    rules: Vec<Rule>,
}

impl ScriptedAssessor {
    pub fn none() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn metric_only() -> Self {
        Self::none().with_metric()
    }

    pub fn informal_only() -> Self {
        Self::none().with_informal()
    }

    /// High: no digit or percent sign anywhere.
    pub fn with_metric(self) -> Self {
        self.with_rule(Rule {
            description: "No quantifiable metric",
            category: ProblemCategory::Missing,
            severity: Severity::High,
            present: |content| !content.chars().any(|c| c.is_ascii_digit() || c == '%'),
        })
    }

    /// Low: the word "stuff".
    pub fn with_informal(self) -> Self {
        self.with_rule(Rule {
            description: "Informal word 'stuff'",
            category: ProblemCategory::Weak,
            severity: Severity::Low,
            present: |content| content.to_lowercase().contains("stuff"),
        })
    }

    /// Medium: the verb "helped".
    pub fn with_vague_verb(self) -> Self {
        self.with_rule(Rule {
            description: "Vague verb 'helped'",
            category: ProblemCategory::Weak,
            severity: Severity::Medium,
            present: |content| content.to_lowercase().contains("helped"),
        })
    }

    fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }
}

#[async_trait]
impl QualityAssessor for ScriptedAssessor {
    async fn assess(
        &self,
        kind: &SectionKind,
        content: &str,
        _requirements: &[JobRequirement],
    ) -> Result<Assessment, RefineError> {
        let problems: Vec<Problem> = self
            .rules
            .iter()
            .filter(|rule| (rule.present)(content))
            .map(|rule| Problem::new(kind.clone(), rule.description, rule.severity, rule.category))
            .collect();
        Ok(Assessment {
            score: if problems.is_empty() { 1.0 } else { 0.5 },
            problems,
            keywords: BTreeSet::new(),
        })
    }
}

enum Reply {
    Answer(Box<dyn Fn(&UserQuery) -> Option<String> + Send + Sync>),
    Abort,
    Silent,
}

/// Records every query it is asked and replies per its mode.
pub struct ScriptedChannel {
    reply: Reply,
    asked: Mutex<Vec<UserQuery>>,
}

impl ScriptedChannel {
    pub fn answering(answer: impl Fn(&UserQuery) -> Option<String> + Send + Sync + 'static) -> Self {
        Self::with(Reply::Answer(Box::new(answer)))
    }

    pub fn declining() -> Self {
        Self::answering(|_| None)
    }

    pub fn aborting() -> Self {
        Self::with(Reply::Abort)
    }

    /// Never replies.
    pub fn silent() -> Self {
        Self::with(Reply::Silent)
    }

    fn with(reply: Reply) -> Self {
        Self {
            reply,
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn asked(&self) -> Vec<UserQuery> {
        self.asked.lock().unwrap().clone()
    }
}

#[async_trait]
impl UserInteractionChannel for ScriptedChannel {
    async fn ask(&self, queries: &[UserQuery]) -> Result<Vec<Option<String>>, InteractionError> {
        self.asked.lock().unwrap().extend(queries.iter().cloned());
        match &self.reply {
            Reply::Answer(answer) => Ok(queries.iter().map(|q| answer(q)).collect()),
            Reply::Abort => Err(InteractionError::UserAbort),
            Reply::Silent => std::future::pending().await,
        }
    }
}
