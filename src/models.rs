//! Session state machine types
//!
//! A search session progresses through five pipeline states with one
//! confirmation self-loop:
//! PLANNING → SEARCHING → AWAITING_CONFIRMATION ⟲ → COLLECTING → REPORTING → DONE
//!
//! Status is monotonic except for the self-loop; DONE and FAILED are terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Session pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Derive search queries from the submitted name and hints
    Planning,
    /// Web search in progress, candidates not yet populated
    Searching,
    /// Candidates ready; waiting for a yes/next signal from the user
    AwaitingConfirmation,
    /// Candidate confirmed; fetching enrichment details
    Collecting,
    /// Details collected; generating the report
    Reporting,
    /// Report stored, session finished
    Done,
    /// Terminal failure (no candidates, exhausted candidates)
    Failed,
}

impl SessionStatus {
    /// Terminal states ignore further `advance` calls
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Done | SessionStatus::Failed)
    }
}

/// One search hit representing a possible match for the queried person
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// User decision on the currently presented candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserSignal {
    /// Confirm the current candidate
    Yes,
    /// Reject the current candidate and advance to the next one
    Next,
}

impl UserSignal {
    /// Parse a decision string. Accepts the synonym sets the web form sends.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yes" | "y" | "match" | "true" => Some(UserSignal::Yes),
            "no" | "n" | "next" | "false" => Some(UserSignal::Next),
            _ => None,
        }
    }
}

/// One end-to-end person-search task and its accumulated state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique session identifier
    pub session_id: Uuid,

    /// Submitted person name (immutable input)
    pub query_name: String,

    /// Free-form hints, e.g. city or occupation (immutable input)
    pub query_hints: String,

    /// Current pipeline state
    pub status: SessionStatus,

    /// Search hits in engine-returned order
    pub candidates: Vec<Candidate>,

    /// Pointer into `candidates` advanced by the confirmation loop;
    /// always <= candidates.len()
    pub current_index: usize,

    /// Confirmed candidate; set exactly once, immutable thereafter
    pub confirmed: Option<Candidate>,

    /// Enrichment key/value pairs, populated only after confirmation
    pub details: HashMap<String, String>,

    /// Generated report text; set exactly once by the reporter step
    pub report: Option<String>,

    /// Human-readable reason when status == failed
    pub failure: Option<String>,

    /// Relative path to an uploaded photo, set at most once
    pub photo_path: Option<String>,

    /// Archived sessions are hidden from the active list but kept on disk
    pub archived: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create a new session in the initial planning state
    pub fn new(query_name: String, query_hints: String) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4(),
            query_name,
            query_hints,
            status: SessionStatus::Planning,
            candidates: Vec::new(),
            current_index: 0,
            confirmed: None,
            details: HashMap::new(),
            report: None,
            failure: None,
            photo_path: None,
            archived: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Transition to a new state and bump the updated timestamp
    pub fn transition_to(&mut self, new_status: SessionStatus) {
        tracing::debug!(
            session_id = %self.session_id,
            old = ?self.status,
            new = ?new_status,
            "Session state transition"
        );
        self.status = new_status;
        self.updated_at = Utc::now();
    }

    /// Mark the session failed with a user-visible reason
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.failure = Some(reason.into());
        self.transition_to(SessionStatus::Failed);
    }

    /// The candidate currently presented for confirmation, if any
    pub fn current_candidate(&self) -> Option<&Candidate> {
        self.candidates.get(self.current_index)
    }
}

/// Structured context handed to the report generator
#[derive(Debug, Clone, Serialize)]
pub struct ReportContext {
    pub query_name: String,
    pub query_hints: String,
    pub candidate: Candidate,
    pub details: HashMap<String, String>,
}

impl ReportContext {
    /// Render the prompt sent to HTTP-backed providers
    pub fn prompt(&self) -> String {
        let mut details: Vec<(&String, &String)> = self.details.iter().collect();
        details.sort();
        let details_text = details
            .iter()
            .map(|(k, v)| format!("- {}: {}", k, v))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "Create a concise, structured report about a person's public online presence.\n\
             Include: basic info, links, inferred roles, and notable summaries from sources.\n\
             If data is sparse, state the limitations.\n\n\
             Name: {}\nHints: {}\n\n\
             Selected candidate:\n- title: {}\n- url: {}\n- snippet: {}\n\n\
             Collected details:\n{}\n\n\
             Return markdown-like text.",
            self.query_name,
            self.query_hints,
            self.candidate.title,
            self.candidate.url,
            self.candidate.snippet,
            details_text,
        )
    }
}
