//! Problem Ledger — per-section history of every problem and its lifecycle.
//!
//! Entries are never removed. Status and counters mutate; identity
//! (normalised description) and discovery order do not.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::RefineError;
use crate::models::problem::{
    normalize_description, Problem, ProblemId, ProblemStatus, QueryAnswer, UserQuery,
};
use crate::models::resume::SectionKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct LedgerEntry {
    problem: Problem,
    identity: String,
    attempts: u32,
    rejected: Vec<String>,
    /// True once the problem has been handed to the user.
    escalated: bool,
    query: Option<UserQuery>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemLedger {
    section: SectionKind,
    /// Discovery order.
    entries: Vec<LedgerEntry>,
}

impl ProblemLedger {
    pub fn new(section: SectionKind) -> Self {
        Self {
            section,
            entries: Vec::new(),
        }
    }

    pub fn section(&self) -> &SectionKind {
        &self.section
    }

    /// Records a problem, returning its id. Idempotent on normalised
    /// description: an already-known problem (whatever its status, including
    /// `Resolved` and `Abandoned`) keeps its entry and id.
    pub fn record(&mut self, mut problem: Problem) -> ProblemId {
        let identity = normalize_description(&problem.description);
        if let Some(existing) = self.entries.iter().find(|e| e.identity == identity) {
            return existing.problem.id;
        }

        problem.section = self.section.clone();
        problem.status = ProblemStatus::Open;
        let id = problem.id;
        debug!(section = %self.section, problem_id = %id, description = %problem.description, "recorded problem");
        self.entries.push(LedgerEntry {
            problem,
            identity,
            attempts: 0,
            rejected: Vec::new(),
            escalated: false,
            query: None,
        });
        id
    }

    /// Advances a problem's status along an allowed edge.
    ///
    /// `AttemptingFix → Abandoned` is only legal once the problem has been
    /// escalated: automated attempts alone never abandon a problem.
    pub fn update_status(&mut self, id: ProblemId, next: ProblemStatus) -> Result<(), RefineError> {
        let entry = self.entry_mut(id)?;
        let current = entry.problem.status;

        let allowed = current.can_transition_to(next)
            && !(current == ProblemStatus::AttemptingFix
                && next == ProblemStatus::Abandoned
                && !entry.escalated);

        if !allowed {
            return Err(RefineError::InvalidTransition {
                id,
                from: current,
                to: next,
            });
        }

        if next == ProblemStatus::Escalated {
            entry.escalated = true;
        }
        entry.problem.status = next;
        Ok(())
    }

    /// Non-terminal problems (`Open`, `AttemptingFix`, `Escalated`), severity
    /// descending, then discovery order.
    pub fn open_problems(&self) -> Vec<&Problem> {
        let mut open: Vec<(usize, &Problem)> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.problem.status.is_terminal())
            .map(|(i, e)| (i, &e.problem))
            .collect();
        // sort_by is stable; discovery index breaks severity ties explicitly anyway.
        open.sort_by(|(ia, a), (ib, b)| b.severity.cmp(&a.severity).then(ia.cmp(ib)));
        open.into_iter().map(|(_, p)| p).collect()
    }

    pub fn attempts(&self, id: ProblemId) -> u32 {
        self.entry(id).map(|e| e.attempts).unwrap_or(0)
    }

    /// Counts one failed or consumed attempt; returns the new count.
    pub fn record_attempt(&mut self, id: ProblemId) -> Result<u32, RefineError> {
        let entry = self.entry_mut(id)?;
        entry.attempts += 1;
        Ok(entry.attempts)
    }

    /// Remembers a candidate that did not clear the problem so the generator
    /// is not offered the same answer twice.
    pub fn reject_candidate(&mut self, id: ProblemId, candidate: String) -> Result<(), RefineError> {
        let entry = self.entry_mut(id)?;
        if !entry.rejected.contains(&candidate) {
            entry.rejected.push(candidate);
        }
        Ok(())
    }

    pub fn rejected_candidates(&self, id: ProblemId) -> &[String] {
        self.entry(id).map(|e| e.rejected.as_slice()).unwrap_or(&[])
    }

    /// Attaches the problem's single user query. If one already exists it is
    /// kept and returned instead.
    pub fn attach_query(&mut self, id: ProblemId, query: UserQuery) -> Result<UserQuery, RefineError> {
        let entry = self.entry_mut(id)?;
        Ok(entry.query.get_or_insert(query).clone())
    }

    pub fn query(&self, id: ProblemId) -> Option<&UserQuery> {
        self.entry(id).and_then(|e| e.query.as_ref())
    }

    pub fn answer(&self, id: ProblemId) -> Option<&QueryAnswer> {
        self.query(id).and_then(|q| q.answer.as_ref())
    }

    /// Stores the user's answer. A query is answered at most once; later
    /// answers for the same problem are ignored.
    pub fn record_answer(&mut self, id: ProblemId, answer: QueryAnswer) -> Result<bool, RefineError> {
        let entry = self.entry_mut(id)?;
        match entry.query.as_mut() {
            Some(query) if query.answer.is_none() => {
                query.answer = Some(answer);
                query.answered_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn get(&self, id: ProblemId) -> Option<&Problem> {
        self.entry(id).map(|e| &e.problem)
    }

    pub fn problems(&self) -> impl Iterator<Item = &Problem> {
        self.entries.iter().map(|e| &e.problem)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn has_unresolved(&self) -> bool {
        self.entries.iter().any(|e| !e.problem.status.is_terminal())
    }

    pub fn count_with(&self, status: ProblemStatus) -> usize {
        self.entries
            .iter()
            .filter(|e| e.problem.status == status)
            .count()
    }

    pub fn abandoned(&self) -> Vec<&Problem> {
        self.problems()
            .filter(|p| p.status == ProblemStatus::Abandoned)
            .collect()
    }

    /// Abort rollback: any problem mid-attempt returns to `Open`, never to
    /// `Resolved`. Queries and answers are kept, so a resumed run picks the
    /// answer up instead of asking again. Returns how many moved.
    pub fn revert_in_flight(&mut self) -> usize {
        let mut reverted = 0;
        for entry in &mut self.entries {
            if entry.problem.status == ProblemStatus::AttemptingFix {
                entry.problem.status = ProblemStatus::Open;
                reverted += 1;
            }
        }
        reverted
    }

    /// Closes an `Open` problem the current content no longer exhibits.
    pub fn retire(&mut self, id: ProblemId) -> Result<(), RefineError> {
        self.update_status(id, ProblemStatus::AttemptingFix)?;
        self.update_status(id, ProblemStatus::Resolved)?;
        debug!(section = %self.section, problem_id = %id, "problem no longer present; resolved");
        Ok(())
    }

    /// Convergence failure exit: every non-terminal problem becomes
    /// `Abandoned` directly, whatever its status. This is the only way a
    /// problem leaves `Open` without passing through `AttemptingFix`.
    pub fn abandon_unresolved(&mut self) -> Vec<ProblemId> {
        let mut abandoned = Vec::new();
        for entry in &mut self.entries {
            if !entry.problem.status.is_terminal() {
                entry.problem.status = ProblemStatus::Abandoned;
                abandoned.push(entry.problem.id);
            }
        }
        abandoned
    }

    fn entry(&self, id: ProblemId) -> Option<&LedgerEntry> {
        self.entries.iter().find(|e| e.problem.id == id)
    }

    fn entry_mut(&mut self, id: ProblemId) -> Result<&mut LedgerEntry, RefineError> {
        self.entries
            .iter_mut()
            .find(|e| e.problem.id == id)
            .ok_or(RefineError::UnknownProblem(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::problem::{ProblemCategory, Severity};

    fn problem(description: &str, severity: Severity, category: ProblemCategory) -> Problem {
        Problem::new(SectionKind::Experience, description, severity, category)
    }

    fn ledger() -> ProblemLedger {
        ProblemLedger::new(SectionKind::Experience)
    }

    #[test]
    fn test_record_is_idempotent_on_normalized_description() {
        let mut ledger = ledger();
        let a = ledger.record(problem(
            "No quantifiable metric",
            Severity::High,
            ProblemCategory::Missing,
        ));
        let b = ledger.record(problem(
            "  no quantifiable   METRIC. ",
            Severity::Low,
            ProblemCategory::Weak,
        ));
        assert_eq!(a, b);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_resolved_problem_is_not_recreated() {
        let mut ledger = ledger();
        let id = ledger.record(problem("Vague verb", Severity::Medium, ProblemCategory::Weak));
        ledger.update_status(id, ProblemStatus::AttemptingFix).unwrap();
        ledger.update_status(id, ProblemStatus::Resolved).unwrap();

        let again = ledger.record(problem("vague verb", Severity::Medium, ProblemCategory::Weak));
        assert_eq!(again, id);
        assert_eq!(ledger.get(id).unwrap().status, ProblemStatus::Resolved);
        assert!(ledger.open_problems().is_empty());
    }

    #[test]
    fn test_open_problems_sorted_by_severity_then_discovery() {
        let mut ledger = ledger();
        let low = ledger.record(problem("first low", Severity::Low, ProblemCategory::Weak));
        let high_a = ledger.record(problem("high a", Severity::High, ProblemCategory::Weak));
        let medium = ledger.record(problem("medium", Severity::Medium, ProblemCategory::Weak));
        let high_b = ledger.record(problem("high b", Severity::High, ProblemCategory::Weak));

        let order: Vec<ProblemId> = ledger.open_problems().iter().map(|p| p.id).collect();
        assert_eq!(order, vec![high_a, high_b, medium, low]);
    }

    #[test]
    fn test_invalid_transition_rejected() {
        let mut ledger = ledger();
        let id = ledger.record(problem("x", Severity::Low, ProblemCategory::Weak));
        let err = ledger.update_status(id, ProblemStatus::Resolved).unwrap_err();
        assert!(matches!(
            err,
            RefineError::InvalidTransition {
                from: ProblemStatus::Open,
                to: ProblemStatus::Resolved,
                ..
            }
        ));
    }

    #[test]
    fn test_abandon_from_attempting_requires_prior_escalation() {
        let mut ledger = ledger();
        let id = ledger.record(problem("x", Severity::Low, ProblemCategory::Weak));
        ledger.update_status(id, ProblemStatus::AttemptingFix).unwrap();
        assert!(ledger.update_status(id, ProblemStatus::Abandoned).is_err());

        ledger.update_status(id, ProblemStatus::Escalated).unwrap();
        ledger.update_status(id, ProblemStatus::AttemptingFix).unwrap();
        ledger.update_status(id, ProblemStatus::Abandoned).unwrap();
        assert_eq!(ledger.get(id).unwrap().status, ProblemStatus::Abandoned);
    }

    #[test]
    fn test_open_problem_cannot_be_abandoned_directly() {
        let mut ledger = ledger();
        let id = ledger.record(problem("x", Severity::Low, ProblemCategory::Weak));
        assert!(matches!(
            ledger.update_status(id, ProblemStatus::Abandoned),
            Err(RefineError::InvalidTransition {
                from: ProblemStatus::Open,
                to: ProblemStatus::Abandoned,
                ..
            })
        ));
    }

    #[test]
    fn test_retire_requires_open_problem() {
        let mut ledger = ledger();
        let id = ledger.record(problem("x", Severity::Low, ProblemCategory::Weak));
        ledger.retire(id).unwrap();
        assert_eq!(ledger.get(id).unwrap().status, ProblemStatus::Resolved);
        assert!(ledger.retire(id).is_err());
    }

    #[test]
    fn test_terminal_states_never_regress() {
        let mut ledger = ledger();
        let id = ledger.record(problem("x", Severity::Low, ProblemCategory::Weak));
        ledger.update_status(id, ProblemStatus::AttemptingFix).unwrap();
        ledger.update_status(id, ProblemStatus::Resolved).unwrap();
        for next in [
            ProblemStatus::Open,
            ProblemStatus::AttemptingFix,
            ProblemStatus::Escalated,
            ProblemStatus::Abandoned,
        ] {
            assert!(ledger.update_status(id, next).is_err());
        }
    }

    #[test]
    fn test_attempts_and_rejections() {
        let mut ledger = ledger();
        let id = ledger.record(problem("x", Severity::Low, ProblemCategory::Weak));
        assert_eq!(ledger.attempts(id), 0);
        assert_eq!(ledger.record_attempt(id).unwrap(), 1);
        ledger.reject_candidate(id, "candidate".into()).unwrap();
        ledger.reject_candidate(id, "candidate".into()).unwrap();
        assert_eq!(ledger.attempts(id), 1);
        assert_eq!(ledger.rejected_candidates(id), &["candidate".to_string()]);
    }

    #[test]
    fn test_single_query_per_problem() {
        let mut ledger = ledger();
        let p = problem("No quantifiable metric", Severity::High, ProblemCategory::Missing);
        let id = ledger.record(p.clone());
        let first = ledger
            .attach_query(id, UserQuery::new(&p, vec!["What changed?".into()]))
            .unwrap();
        let second = ledger
            .attach_query(id, UserQuery::new(&p, vec!["Ask again?".into()]))
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(ledger.query(id).unwrap().questions, vec!["What changed?".to_string()]);
    }

    #[test]
    fn test_answer_recorded_once() {
        let mut ledger = ledger();
        let p = problem("x", Severity::High, ProblemCategory::Missing);
        let id = ledger.record(p.clone());
        ledger.attach_query(id, UserQuery::new(&p, vec!["q".into()])).unwrap();
        assert!(ledger
            .record_answer(id, QueryAnswer::Provided("first".into()))
            .unwrap());
        assert!(!ledger.record_answer(id, QueryAnswer::Declined).unwrap());
        assert_eq!(
            ledger.answer(id),
            Some(&QueryAnswer::Provided("first".into()))
        );
    }

    #[test]
    fn test_revert_in_flight_returns_to_open_not_resolved() {
        let mut ledger = ledger();
        let fresh = ledger.record(problem("a", Severity::Low, ProblemCategory::Weak));
        let answered = ledger.record(problem("b", Severity::Low, ProblemCategory::Missing));
        ledger.update_status(fresh, ProblemStatus::AttemptingFix).unwrap();
        ledger.update_status(answered, ProblemStatus::AttemptingFix).unwrap();
        ledger.update_status(answered, ProblemStatus::Escalated).unwrap();
        ledger.update_status(answered, ProblemStatus::AttemptingFix).unwrap();

        ledger
            .record_answer(answered, QueryAnswer::Provided("40%".into()))
            .unwrap();

        assert_eq!(ledger.revert_in_flight(), 2);
        assert_eq!(ledger.get(fresh).unwrap().status, ProblemStatus::Open);
        assert_eq!(ledger.get(answered).unwrap().status, ProblemStatus::Open);
        assert_eq!(
            ledger.answer(answered),
            Some(&QueryAnswer::Provided("40%".into()))
        );
    }

    #[test]
    fn test_abandon_unresolved_terminates_everything() {
        let mut ledger = ledger();
        let open = ledger.record(problem("a", Severity::Low, ProblemCategory::Weak));
        let escalated = ledger.record(problem("b", Severity::Low, ProblemCategory::Missing));
        let done = ledger.record(problem("c", Severity::Low, ProblemCategory::Weak));
        let answered = ledger.record(problem("d", Severity::Low, ProblemCategory::Weak));
        ledger.update_status(escalated, ProblemStatus::AttemptingFix).unwrap();
        ledger.update_status(escalated, ProblemStatus::Escalated).unwrap();
        ledger.retire(done).unwrap();
        ledger.update_status(answered, ProblemStatus::AttemptingFix).unwrap();

        let abandoned = ledger.abandon_unresolved();
        assert_eq!(abandoned, vec![open, escalated, answered]);
        assert!(!ledger.has_unresolved());
        assert_eq!(ledger.count_with(ProblemStatus::Resolved), 1);
    }

    #[test]
    fn test_ledger_roundtrips_through_json() {
        let mut ledger = ledger();
        let id = ledger.record(problem("x", Severity::High, ProblemCategory::Weak));
        ledger.record_attempt(id).unwrap();
        let json = serde_json::to_string(&ledger).unwrap();
        let restored: ProblemLedger = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, ledger);
    }
}
