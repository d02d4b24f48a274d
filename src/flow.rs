//! Orchestration flow
//!
//! Drives a session through the five-step pipeline with a single `advance`
//! entry point. Each transition is a function of the current state plus at
//! most one user signal; the session is persisted after every state mutation
//! so no step begins before the previous step's result is durable.
//!
//! Adapter failures are translated at this boundary: an empty search result
//! becomes a `failed` session, a detail-fetch miss degrades enrichment, and a
//! provider error degrades to the deterministic fallback renderer. Nothing
//! here propagates a raw adapter error to the caller; only persistence errors
//! are fatal.

use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{info, warn};

use crate::db::sessions::save_session;
use crate::error::{Error, Result};
use crate::fetch::DetailFetcher;
use crate::llm::{fallback, ReportGenerator};
use crate::models::{ReportContext, Session, SessionStatus, UserSignal};
use crate::search::{build_queries, SearchProvider};

/// Session pipeline driver
#[derive(Clone)]
pub struct Flow {
    db: SqlitePool,
    search: Arc<dyn SearchProvider>,
    fetcher: Arc<dyn DetailFetcher>,
    generator: Arc<dyn ReportGenerator>,
}

impl Flow {
    pub fn new(
        db: SqlitePool,
        search: Arc<dyn SearchProvider>,
        fetcher: Arc<dyn DetailFetcher>,
        generator: Arc<dyn ReportGenerator>,
    ) -> Self {
        Self {
            db,
            search,
            fetcher,
            generator,
        }
    }

    /// Advance the session as far as it can go without further user input
    ///
    /// Stops on awaiting_confirmation (needs a signal) and on the terminal
    /// states. The signal is consumed by the first confirmation decision.
    pub async fn advance(&self, mut session: Session, signal: Option<UserSignal>) -> Result<Session> {
        let mut signal = signal;

        loop {
            match session.status {
                SessionStatus::Planning => self.plan(&mut session).await?,
                SessionStatus::Searching => self.search_candidates(&mut session).await?,
                SessionStatus::AwaitingConfirmation => match signal.take() {
                    Some(decision) => self.decide(&mut session, decision).await?,
                    None => return Ok(session),
                },
                SessionStatus::Collecting => self.collect(&mut session).await?,
                SessionStatus::Reporting => self.report(&mut session).await?,
                SessionStatus::Done | SessionStatus::Failed => return Ok(session),
            }
        }
    }

    /// planning -> searching
    async fn plan(&self, session: &mut Session) -> Result<()> {
        info!(
            session_id = %session.session_id,
            name = %session.query_name,
            "Planning search"
        );
        session.transition_to(SessionStatus::Searching);
        save_session(&self.db, session).await
    }

    /// searching -> awaiting_confirmation, or failed on an empty result set
    async fn search_candidates(&self, session: &mut Session) -> Result<()> {
        let queries = build_queries(&session.query_name, &session.query_hints);
        let candidates = self.search.search(&queries).await;

        if candidates.is_empty() {
            warn!(session_id = %session.session_id, "Search produced no candidates");
            session.fail("no candidates found");
        } else {
            info!(
                session_id = %session.session_id,
                count = candidates.len(),
                "Candidates ready for confirmation"
            );
            session.candidates = candidates;
            session.current_index = 0;
            session.transition_to(SessionStatus::AwaitingConfirmation);
        }
        save_session(&self.db, session).await
    }

    /// Confirmation self-loop: yes confirms, next advances or exhausts
    async fn decide(&self, session: &mut Session, decision: UserSignal) -> Result<()> {
        match decision {
            UserSignal::Yes => {
                let candidate = session
                    .current_candidate()
                    .cloned()
                    .ok_or_else(|| Error::Internal("No candidate at current index".to_string()))?;
                info!(
                    session_id = %session.session_id,
                    url = %candidate.url,
                    "Candidate confirmed"
                );
                session.confirmed = Some(candidate);
                session.transition_to(SessionStatus::Collecting);
            }
            UserSignal::Next => {
                session.current_index += 1;
                if session.current_index >= session.candidates.len() {
                    warn!(session_id = %session.session_id, "Candidates exhausted");
                    session.fail("exhausted candidates");
                } else {
                    // Self-loop: stay awaiting with the next candidate presented
                    session.transition_to(SessionStatus::AwaitingConfirmation);
                }
            }
        }
        save_session(&self.db, session).await
    }

    /// collecting -> reporting; enrichment is best-effort
    async fn collect(&self, session: &mut Session) -> Result<()> {
        let candidate = session
            .confirmed
            .clone()
            .ok_or_else(|| Error::Internal("Collecting without a confirmed candidate".to_string()))?;

        session
            .details
            .insert("url".to_string(), candidate.url.clone());
        if !candidate.snippet.is_empty() {
            session
                .details
                .insert("snippet".to_string(), candidate.snippet.clone());
        }

        match self.fetcher.fetch_title(&candidate.url).await {
            Some(title) => {
                session.details.insert("title".to_string(), title);
            }
            None if !candidate.title.is_empty() => {
                // Degrade to the search-hit title
                session
                    .details
                    .insert("title".to_string(), candidate.title.clone());
            }
            None => {}
        }

        info!(
            session_id = %session.session_id,
            detail_keys = session.details.len(),
            "Details collected"
        );
        session.transition_to(SessionStatus::Reporting);
        save_session(&self.db, session).await
    }

    /// reporting -> done; provider failure degrades to the fallback renderer
    async fn report(&self, session: &mut Session) -> Result<()> {
        let candidate = session
            .confirmed
            .clone()
            .ok_or_else(|| Error::Internal("Reporting without a confirmed candidate".to_string()))?;

        let context = ReportContext {
            query_name: session.query_name.clone(),
            query_hints: session.query_hints.clone(),
            candidate,
            details: session.details.clone(),
        };

        let text = match self.generator.generate_report(&context).await {
            Ok(text) => text,
            Err(e) => {
                warn!(
                    session_id = %session.session_id,
                    provider = self.generator.name(),
                    error = %e,
                    "Provider failed, using fallback renderer"
                );
                fallback::render(&context)
            }
        };

        info!(session_id = %session.session_id, "Report generated");
        session.report = Some(text);
        session.transition_to(SessionStatus::Done);
        save_session(&self.db, session).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_pool;
    use crate::db::sessions::load_session;
    use crate::llm::FallbackRenderer;
    use crate::models::Candidate;
    use async_trait::async_trait;

    struct MockSearch {
        candidates: Vec<Candidate>,
    }

    #[async_trait]
    impl SearchProvider for MockSearch {
        async fn search(&self, _queries: &[String]) -> Vec<Candidate> {
            self.candidates.clone()
        }
    }

    struct MockFetch {
        title: Option<String>,
    }

    #[async_trait]
    impl DetailFetcher for MockFetch {
        async fn fetch_title(&self, _url: &str) -> Option<String> {
            self.title.clone()
        }
    }

    struct GatedSearch {
        entered: Arc<tokio::sync::Notify>,
        release: Arc<tokio::sync::Notify>,
        candidates: Vec<Candidate>,
    }

    #[async_trait]
    impl SearchProvider for GatedSearch {
        async fn search(&self, _queries: &[String]) -> Vec<Candidate> {
            self.entered.notify_one();
            self.release.notified().await;
            self.candidates.clone()
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl ReportGenerator for FailingGenerator {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn generate_report(&self, _context: &ReportContext) -> Result<String> {
            Err(Error::Provider("simulated outage".to_string()))
        }
    }

    fn candidates(n: usize) -> Vec<Candidate> {
        (0..n)
            .map(|i| Candidate {
                title: format!("Jane Doe hit {}", i),
                url: format!("https://example.com/jane/{}", i),
                snippet: format!("snippet {}", i),
            })
            .collect()
    }

    async fn flow_with(
        search: Vec<Candidate>,
        fetched_title: Option<String>,
        generator: Arc<dyn ReportGenerator>,
    ) -> Flow {
        let pool = init_memory_pool().await.unwrap();
        Flow::new(
            pool,
            Arc::new(MockSearch { candidates: search }),
            Arc::new(MockFetch {
                title: fetched_title,
            }),
            generator,
        )
    }

    #[tokio::test]
    async fn empty_search_fails_with_no_confirmed_candidate() {
        let flow = flow_with(Vec::new(), None, Arc::new(FallbackRenderer)).await;
        let session = Session::new("Jane Doe".into(), String::new());
        let session = flow.advance(session, None).await.unwrap();

        assert_eq!(session.status, SessionStatus::Failed);
        assert_eq!(session.failure.as_deref(), Some("no candidates found"));
        assert!(session.confirmed.is_none());
        assert!(session.report.is_none());
    }

    #[tokio::test]
    async fn first_advance_stops_awaiting_confirmation() {
        let flow = flow_with(candidates(3), None, Arc::new(FallbackRenderer)).await;
        let session = Session::new("Jane Doe".into(), String::new());
        let session = flow.advance(session, None).await.unwrap();

        assert_eq!(session.status, SessionStatus::AwaitingConfirmation);
        assert_eq!(session.candidates.len(), 3);
        assert_eq!(session.current_index, 0);
        assert!(session.confirmed.is_none());
    }

    #[tokio::test]
    async fn next_next_yes_confirms_the_third_candidate() {
        // The Jane Doe scenario: 3 candidates, next, next, yes
        let flow = flow_with(
            candidates(3),
            Some("Jane Doe | Profile".to_string()),
            Arc::new(FallbackRenderer),
        )
        .await;
        let session = Session::new("Jane Doe".into(), "Seattle engineer".into());

        let session = flow.advance(session, None).await.unwrap();
        let session = flow.advance(session, Some(UserSignal::Next)).await.unwrap();
        assert_eq!(session.current_index, 1);
        assert_eq!(session.status, SessionStatus::AwaitingConfirmation);

        let session = flow.advance(session, Some(UserSignal::Next)).await.unwrap();
        assert_eq!(session.current_index, 2);

        let session = flow.advance(session, Some(UserSignal::Yes)).await.unwrap();
        assert_eq!(session.status, SessionStatus::Done);
        assert_eq!(
            session.confirmed.as_ref().map(|c| c.url.as_str()),
            Some("https://example.com/jane/2")
        );
        assert_eq!(
            session.details.get("title").map(String::as_str),
            Some("Jane Doe | Profile")
        );
        let report = session.report.as_deref().unwrap();
        assert!(report.contains("Jane Doe"));
    }

    #[tokio::test]
    async fn exhausting_candidates_fails_without_overrun() {
        let flow = flow_with(candidates(2), None, Arc::new(FallbackRenderer)).await;
        let session = Session::new("Jane Doe".into(), String::new());
        let session = flow.advance(session, None).await.unwrap();

        let session = flow.advance(session, Some(UserSignal::Next)).await.unwrap();
        assert_eq!(session.status, SessionStatus::AwaitingConfirmation);
        assert_eq!(session.current_index, 1);

        let session = flow.advance(session, Some(UserSignal::Next)).await.unwrap();
        assert_eq!(session.status, SessionStatus::Failed);
        assert_eq!(session.failure.as_deref(), Some("exhausted candidates"));
        assert!(session.confirmed.is_none());

        // Terminal state ignores further signals
        let session = flow.advance(session, Some(UserSignal::Yes)).await.unwrap();
        assert_eq!(session.status, SessionStatus::Failed);
        assert!(session.confirmed.is_none());
    }

    #[tokio::test]
    async fn provider_failure_degrades_to_fallback_and_completes() {
        let flow = flow_with(candidates(1), None, Arc::new(FailingGenerator)).await;
        let session = Session::new("Jane Doe".into(), String::new());
        let session = flow.advance(session, None).await.unwrap();
        let session = flow.advance(session, Some(UserSignal::Yes)).await.unwrap();

        assert_eq!(session.status, SessionStatus::Done);
        let report = session.report.as_deref().unwrap();
        assert!(!report.trim().is_empty());
        assert!(report.contains("Jane Doe"));
    }

    #[tokio::test]
    async fn fetch_miss_degrades_to_the_search_hit_title() {
        let flow = flow_with(candidates(1), None, Arc::new(FallbackRenderer)).await;
        let session = Session::new("Jane Doe".into(), String::new());
        let session = flow.advance(session, None).await.unwrap();
        let session = flow.advance(session, Some(UserSignal::Yes)).await.unwrap();

        assert_eq!(session.status, SessionStatus::Done);
        assert_eq!(
            session.details.get("title").map(String::as_str),
            Some("Jane Doe hit 0")
        );
    }

    #[tokio::test]
    async fn every_transition_is_persisted() {
        let pool = init_memory_pool().await.unwrap();
        let flow = Flow::new(
            pool.clone(),
            Arc::new(MockSearch {
                candidates: candidates(1),
            }),
            Arc::new(MockFetch { title: None }),
            Arc::new(FallbackRenderer),
        );

        let session = Session::new("Jane Doe".into(), String::new());
        let session = flow.advance(session, None).await.unwrap();
        let stored = load_session(&pool, session.session_id).await.unwrap().unwrap();
        assert_eq!(stored, session);

        let session = flow.advance(session, Some(UserSignal::Yes)).await.unwrap();
        let stored = load_session(&pool, session.session_id).await.unwrap().unwrap();
        assert_eq!(stored, session);
        assert_eq!(stored.status, SessionStatus::Done);
    }

    #[tokio::test]
    async fn photo_recorded_mid_pipeline_survives_later_saves() {
        use crate::db::sessions::set_photo_path;

        let pool = init_memory_pool().await.unwrap();
        let entered = Arc::new(tokio::sync::Notify::new());
        let release = Arc::new(tokio::sync::Notify::new());
        let flow = Flow::new(
            pool.clone(),
            Arc::new(GatedSearch {
                entered: entered.clone(),
                release: release.clone(),
                candidates: candidates(2),
            }),
            Arc::new(MockFetch { title: None }),
            Arc::new(FallbackRenderer),
        );

        let session = Session::new("Jane Doe".into(), String::new());
        let session_id = session.session_id;
        save_session(&pool, &session).await.unwrap();

        let task = tokio::spawn(async move { flow.advance(session, None).await });

        // Record the photo while the pipeline is paused inside the search step
        entered.notified().await;
        assert!(set_photo_path(&pool, session_id, "photo.jpg").await.unwrap());
        release.notify_one();

        task.await.unwrap().unwrap();

        let stored = load_session(&pool, session_id).await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::AwaitingConfirmation);
        assert_eq!(stored.photo_path.as_deref(), Some("photo.jpg"));
    }

    #[tokio::test]
    async fn confirmed_only_set_in_post_confirmation_states() {
        let flow = flow_with(candidates(2), None, Arc::new(FallbackRenderer)).await;
        let session = Session::new("Jane Doe".into(), String::new());

        let session = flow.advance(session, None).await.unwrap();
        assert!(session.confirmed.is_none());

        let session = flow.advance(session, Some(UserSignal::Next)).await.unwrap();
        assert!(session.confirmed.is_none());

        let session = flow.advance(session, Some(UserSignal::Yes)).await.unwrap();
        assert!(session.confirmed.is_some());
        assert!(matches!(
            session.status,
            SessionStatus::Collecting | SessionStatus::Reporting | SessionStatus::Done
        ));
        // Report only present once done
        assert_eq!(session.status, SessionStatus::Done);
        assert!(session.report.is_some());
    }
}
