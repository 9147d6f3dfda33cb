//! Top-level crawl control loop.
//!
//! Turns the configured search terms into persisted listing record groups:
//! results view -> candidate discovery -> freshness gate -> navigation ->
//! extraction -> upsert, with human pacing between operations. The browser
//! session is a single stateful resource owned by this orchestrator for the
//! whole batch; tabbed mode only round-robins the active tab inside the same
//! logical thread, it never runs the session from two tasks at once.

use anyhow::{Context, Result};
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::crawling::discovery::CandidateDiscovery;
use crate::crawling::error::CrawlError;
use crate::crawling::extraction::ExtractionAdapter;
use crate::crawling::freshness::FreshnessCache;
use crate::crawling::navigation::{NavOutcome, NavigationEngine};
use crate::crawling::state::{HarvestReport, TermAbort, TermReport};
use crate::crawling::tabs::{self, ProcessingMode};
use crate::crawling::upsert::UpsertEngine;
use crate::domain::candidate_url::CandidateUrl;
use crate::domain::services::{BrowserDriver, ListingStore, VisionClassifier};
use crate::infrastructure::config::AppConfig;

/// One search term's remaining work during the visiting phase.
struct TermWork {
    term: String,
    results_url: String,
    tab: Option<String>,
    queue: VecDeque<CandidateUrl>,
    report: TermReport,
}

pub struct HarvestOrchestrator {
    driver: Arc<dyn BrowserDriver>,
    classifier: Arc<dyn VisionClassifier>,
    store: Arc<dyn ListingStore>,
    cache: FreshnessCache,
    navigation: NavigationEngine,
    discovery: CandidateDiscovery,
    config: AppConfig,
    cancellation: CancellationToken,
}

impl HarvestOrchestrator {
    pub fn new(
        driver: Arc<dyn BrowserDriver>,
        classifier: Arc<dyn VisionClassifier>,
        store: Arc<dyn ListingStore>,
        config: AppConfig,
    ) -> Result<Self> {
        config.validate()?;
        let navigation =
            NavigationEngine::new(&config.navigation).context("invalid navigation config")?;
        let discovery = CandidateDiscovery::new(
            &config.search,
            &config.navigation.item_link_selector,
            config.navigation.poll_interval_ms,
        );
        let cache = FreshnessCache::new(&config.freshness);
        Ok(Self {
            driver,
            classifier,
            store,
            cache,
            navigation,
            discovery,
            config,
            cancellation: CancellationToken::new(),
        })
    }

    /// Token observers can use to request a cooperative stop. The signal is
    /// checked between discrete steps; an in-flight navigation or classifier
    /// call runs to its own timeout first.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Run one full batch over all configured search terms.
    pub async fn run(&self) -> Result<HarvestReport> {
        let batch_id = uuid::Uuid::new_v4();
        let started_at = Utc::now();
        let terms = self.config.search.terms.clone();
        info!("starting harvest batch {} over {} terms", batch_id, terms.len());

        let mode = tabs::select_mode(self.driver.as_ref(), terms.len()).await;
        info!("processing mode: {:?}", mode);

        let mut works = self.discovery_phase(&terms, mode).await;
        self.visiting_phase(&mut works, mode).await;

        let report = HarvestReport {
            batch_id,
            started_at,
            finished_at: Utc::now(),
            terms: works.into_iter().map(|w| w.report).collect(),
        };
        info!(
            "harvest batch {} finished: {} visited, {} persisted, wall={}",
            batch_id,
            report.total_visited(),
            report.total_persisted(),
            report.hit_wall()
        );
        Ok(report)
    }

    /// Navigate each term's results view, discover candidates, and filter
    /// them through the freshness gate.
    async fn discovery_phase(&self, terms: &[String], mode: ProcessingMode) -> Vec<TermWork> {
        let tab_handles = self.assign_tabs(terms.len(), mode).await;
        let mut works = Vec::with_capacity(terms.len());

        for (i, term) in terms.iter().enumerate() {
            let mut work = TermWork {
                term: term.clone(),
                results_url: self.config.results_url(term),
                tab: tab_handles.get(i).cloned().flatten(),
                queue: VecDeque::new(),
                report: TermReport::new(term),
            };

            if self.cancellation.is_cancelled() {
                work.report.aborted = Some(TermAbort::Cancelled);
                works.push(work);
                continue;
            }

            if let Some(tab) = &work.tab {
                if let Err(e) = self.driver.switch_tab(tab).await {
                    warn!("tab switch failed for '{}', using active tab: {e:#}", term);
                }
            }

            match self.discover_for_term(&mut work).await {
                Ok(()) => {}
                Err(abort) => work.report.aborted = Some(abort),
            }
            works.push(work);

            self.pause(
                self.config.pacing.between_searches_min_ms,
                self.config.pacing.between_searches_max_ms,
            )
            .await;
        }
        works
    }

    async fn discover_for_term(&self, work: &mut TermWork) -> std::result::Result<(), TermAbort> {
        info!("discovering candidates for '{}'", work.term);
        if let Err(e) = self.driver.navigate(&work.results_url).await {
            warn!("results navigation failed for '{}': {e:#}", work.term);
            return Ok(());
        }
        if let Some(abort) = self.wall_abort().await {
            return Err(abort);
        }

        let candidates = match self.discovery.collect(self.driver.as_ref()).await {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!("discovery failed for '{}': {e:#}", work.term);
                return Ok(());
            }
        };
        work.report.discovered = candidates.len();

        // Bulk refresh is interval-gated; lookups below never hit the store.
        self.cache.refresh_if_due(self.store.as_ref()).await;
        for candidate in candidates {
            if self.cache.should_process(&candidate.canonical).await {
                work.queue.push_back(candidate);
            } else {
                debug!("skipping fresh listing {}", candidate.canonical);
            }
        }
        work.report.eligible = work.queue.len();
        info!(
            "'{}': {} discovered, {} eligible after freshness gate",
            work.term, work.report.discovered, work.report.eligible
        );
        Ok(())
    }

    /// Visit every eligible candidate. Sequential mode drains one term at a
    /// time; tabbed mode takes one candidate per term per round, switching
    /// the active tab before each operation so page settling overlaps other
    /// tabs' work.
    async fn visiting_phase(&self, works: &mut [TermWork], mode: ProcessingMode) {
        match mode {
            ProcessingMode::Sequential => {
                for work in works.iter_mut() {
                    while work.report.aborted.is_none() && !work.queue.is_empty() {
                        self.visit_next(work).await;
                    }
                }
            }
            ProcessingMode::Tabbed => loop {
                let mut progressed = false;
                for work in works.iter_mut() {
                    if work.report.aborted.is_some() || work.queue.is_empty() {
                        continue;
                    }
                    if let Some(tab) = &work.tab {
                        if let Err(e) = self.driver.switch_tab(tab).await {
                            warn!("tab switch failed for '{}': {e:#}", work.term);
                        }
                    }
                    self.visit_next(work).await;
                    progressed = true;
                }
                if !progressed {
                    break;
                }
            },
        }
    }

    /// Pop and process one candidate for this term, folding the explicit
    /// per-step error taxonomy into the term report. Nothing propagates out
    /// of a single-candidate iteration; only wall errors abort the term.
    async fn visit_next(&self, work: &mut TermWork) {
        if self.cancellation.is_cancelled() {
            work.report.aborted = Some(TermAbort::Cancelled);
            work.queue.clear();
            return;
        }
        let Some(candidate) = work.queue.pop_front() else {
            return;
        };

        // Discovery for every term runs before any visits, so a URL that
        // surfaces in two terms' feeds passes both freshness gates. Re-check
        // before paying for navigation and a classifier call.
        if !self.cache.should_process(&candidate.canonical).await {
            debug!("skipping {}, already processed earlier in this batch", candidate);
            return;
        }

        match self.visit_candidate(&candidate, work).await {
            Ok(extraction_failed) => {
                work.report.visited += 1;
                work.report.persisted += 1;
                if extraction_failed {
                    work.report.extraction_failures += 1;
                }
            }
            Err(e) => {
                warn!("candidate {} failed: {e}", candidate);
                match &e {
                    CrawlError::NavigationFailure { .. } | CrawlError::Session(_) => {
                        work.report.navigation_failures += 1;
                    }
                    CrawlError::ExtractionFailure(_) => {
                        work.report.visited += 1;
                        work.report.extraction_failures += 1;
                    }
                    CrawlError::PersistenceFailure(_) => {
                        work.report.visited += 1;
                        work.report.persistence_failures += 1;
                    }
                    CrawlError::LoginWallDetected => {
                        work.report.aborted = Some(TermAbort::LoginRequired);
                    }
                    CrawlError::BlockedOrRateLimited => {
                        work.report.aborted = Some(TermAbort::Blocked);
                    }
                }
                if e.aborts_term() {
                    work.queue.clear();
                    return;
                }
            }
        }

        self.pause(
            self.config.pacing.between_listings_min_ms,
            self.config.pacing.between_listings_max_ms,
        )
        .await;
    }

    /// Navigate, extract, and persist one candidate. Returns whether the
    /// persisted group was flagged extraction-failed.
    async fn visit_candidate(
        &self,
        candidate: &CandidateUrl,
        work: &TermWork,
    ) -> std::result::Result<bool, CrawlError> {
        let outcome = self
            .navigation
            .navigate_to_listing(self.driver.as_ref(), candidate, &work.results_url)
            .await
            .map_err(|e| CrawlError::Session(format!("{e:#}")))?;

        let strategy = match outcome {
            NavOutcome::Success { strategy } => strategy,
            NavOutcome::Failed => {
                return Err(CrawlError::NavigationFailure { url: candidate.canonical.clone() })
            }
            NavOutcome::LoginRequired => return Err(CrawlError::LoginWallDetected),
            NavOutcome::Blocked => return Err(CrawlError::BlockedOrRateLimited),
        };
        debug!("reached {} via {:?}", candidate, strategy);

        let group = ExtractionAdapter::extract(
            self.driver.as_ref(),
            self.classifier.as_ref(),
            candidate,
            &work.term,
        )
        .await
        .map_err(|e| CrawlError::ExtractionFailure(format!("{e:#}")))?;

        let now = Utc::now();
        let upsert = UpsertEngine::new(self.store.as_ref());
        let rows = upsert
            .replace_listing(&group, now)
            .await
            .map_err(|e| CrawlError::PersistenceFailure(format!("{e:#}")))?;

        // Freshness advances only after a successful persist so a failed
        // write is retried on the next run.
        self.cache.mark_processed(&candidate.canonical, now).await;
        debug!("persisted {} rows for {}", rows, candidate);
        Ok(group.extraction_failed)
    }

    /// In tabbed mode, one tab per term: reuse what is open, then open more.
    async fn assign_tabs(&self, term_count: usize, mode: ProcessingMode) -> Vec<Option<String>> {
        if mode != ProcessingMode::Tabbed {
            return vec![None; term_count];
        }
        let mut handles: Vec<Option<String>> = match self.driver.list_tabs().await {
            Ok(tabs) => tabs.into_iter().take(term_count).map(Some).collect(),
            Err(_) => Vec::new(),
        };
        while handles.len() < term_count {
            match self.driver.open_tab().await {
                Ok(handle) => handles.push(Some(handle)),
                Err(e) => {
                    warn!("could not open tab {}, sharing the last one: {e:#}", handles.len());
                    handles.push(None);
                }
            }
        }
        handles
    }

    async fn wall_abort(&self) -> Option<TermAbort> {
        match self.navigation.detect_wall(self.driver.as_ref()).await {
            Some(NavOutcome::LoginRequired) => Some(TermAbort::LoginRequired),
            Some(NavOutcome::Blocked) => Some(TermAbort::Blocked),
            _ => None,
        }
    }

    /// Human-pacing jittered delay, uniform over `[min_ms, max_ms]`.
    async fn pause(&self, min_ms: u64, max_ms: u64) {
        if max_ms == 0 {
            return;
        }
        let ms = if min_ms >= max_ms { min_ms } else { fastrand::u64(min_ms..=max_ms) };
        sleep(Duration::from_millis(ms)).await;
    }
}
