use crate::chart::{ChartImage, ChartRasterizer};
use crate::compose::{RenderedReport, ReportComposer};
use crate::dispatch::{
    ContentStore, DeliveryReport, Dispatcher, EmailSender, SmsSender, document_digest,
};
use crate::enhance::{EnhanceOptions, EnhanceRequest, TextEnhancer, apply_response};
use crate::error::{ReportError, Result, Stage};
use crate::metrics::{MetricsPatch, MetricsSnapshot};
use crate::model::{
    Client, DateRange, DeliveryOptions, DeliveryOutcome, MediaAttachment, ReportDraft,
    ReportStatus,
};
use crate::narrative::{NarrativeStatus, SecurityCode, Weekday};
use crate::persist::DraftRepository;
use crate::style::BrandingSettings;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Client and metrics upstream, out of scope for this crate beyond the
/// interface.
#[async_trait]
pub trait ClientDirectory: Send + Sync {
    async fn clients_for_user(&self, user_id: &str) -> Result<Vec<Client>>;
}

#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn client_metrics(&self, client_id: &str, range: &DateRange)
    -> Result<MetricsSnapshot>;
}

#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Coalescing window for persistence writes. Zero saves on every
    /// mutation; stage transitions always flush regardless.
    pub save_debounce: Duration,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            save_debounce: Duration::ZERO,
        }
    }
}

// Progress weights, summing to 100.
const WEIGHT_CLIENT: u32 = 15;
const WEIGHT_METRICS: u32 = 15;
const WEIGHT_NARRATIVES: u32 = 20;
const WEIGHT_MEDIA: u32 = 5;
const WEIGHT_CHART: u32 = 10;
const WEIGHT_BRANDING: u32 = 10;
const WEIGHT_RECIPIENTS: u32 = 15;
const WEIGHT_SUMMARY: u32 = 10;
const SUMMARY_FULL_CREDIT_CHARS: usize = 120;

/// Owns one report session: the draft, its client, and the stage guards.
/// Every mutation is mirrored into the injected repository; stage failures
/// leave the draft and status exactly as they were.
pub struct ReportWorkflow<R: DraftRepository> {
    draft: ReportDraft,
    client: Option<Client>,
    repo: Arc<R>,
    config: WorkflowConfig,
    last_save: Option<Instant>,
    save_pending: bool,
    enhance_in_flight: bool,
    dispatch_in_flight: bool,
    enhance_generation: u64,
    chart_revision: u64,
}

impl<R: DraftRepository> ReportWorkflow<R> {
    /// Session start: initializes storage and recovers a persisted draft if
    /// one exists.
    pub async fn resume(repo: Arc<R>, config: WorkflowConfig) -> Result<Self> {
        repo.init().await?;
        let draft = match repo.load().await? {
            Some(draft) => {
                info!(status = ?draft.status, "recovered persisted draft");
                draft
            }
            None => ReportDraft::new(),
        };
        Ok(Self {
            draft,
            client: None,
            repo,
            config,
            last_save: None,
            save_pending: false,
            enhance_in_flight: false,
            dispatch_in_flight: false,
            enhance_generation: 0,
            chart_revision: 0,
        })
    }

    pub fn draft(&self) -> &ReportDraft {
        &self.draft
    }

    pub fn status(&self) -> ReportStatus {
        self.draft.status
    }

    pub fn client(&self) -> Option<&Client> {
        self.client.as_ref()
    }

    pub fn chart_revision(&self) -> u64 {
        self.chart_revision
    }

    fn require_client(&self) -> Result<&Client> {
        self.client.as_ref().ok_or(ReportError::MissingClient)
    }

    fn bump_chart_revision(&mut self) {
        self.chart_revision = self.chart_revision.wrapping_add(1);
    }

    fn try_advance(&mut self, next: ReportStatus) {
        if self.draft.status.can_advance_to(next) {
            info!(from = ?self.draft.status, to = ?next, "report status advanced");
            self.draft.status = next;
        }
    }

    /// Selects the client for this session. A client may only be chosen
    /// once; re-selecting the same client (after a resume) reattaches it.
    pub async fn select_client(&mut self, client: Client) -> Result<()> {
        match &self.draft.client_id {
            Some(existing) if *existing == client.id => {
                self.client = Some(client);
                Ok(())
            }
            Some(_) => Err(ReportError::ClientAlreadySelected),
            None => {
                self.draft.client_id = Some(client.id.clone());
                self.draft.theme = client.branding_defaults.clone();
                self.client = Some(client);
                self.bump_chart_revision();
                self.persist().await
            }
        }
    }

    pub async fn set_date_range(&mut self, range: DateRange) -> Result<()> {
        self.require_client()?;
        self.draft.date_range = range;
        self.bump_chart_revision();
        self.persist().await
    }

    pub async fn update_metrics(&mut self, patch: MetricsPatch) -> Result<()> {
        self.require_client()?;
        self.draft.metrics.apply(&patch);
        self.bump_chart_revision();
        self.persist().await
    }

    /// Replaces the snapshot with fresh numbers from the upstream source.
    pub async fn load_metrics(&mut self, source: &dyn MetricsSource) -> Result<()> {
        let client_id = self.require_client()?.id.clone();
        let snapshot = source
            .client_metrics(&client_id, &self.draft.date_range)
            .await?;
        self.draft.metrics = snapshot;
        self.bump_chart_revision();
        self.persist().await
    }

    pub async fn set_narrative(
        &mut self,
        day: Weekday,
        content: impl Into<String> + Send,
        status: NarrativeStatus,
        code: SecurityCode,
    ) -> Result<()> {
        self.require_client()?;
        self.draft.narratives.set_day(day, content, status, code);
        self.persist().await
    }

    /// Boundary variant taking the day as free text; an unknown name fails
    /// before anything is mutated.
    pub async fn set_narrative_named(
        &mut self,
        day: &str,
        content: impl Into<String> + Send,
        status: NarrativeStatus,
        code: SecurityCode,
    ) -> Result<()> {
        let day = Weekday::parse(day)?;
        self.set_narrative(day, content, status, code).await
    }

    pub async fn set_summary(&mut self, summary: impl Into<String> + Send) -> Result<()> {
        self.require_client()?;
        self.draft.summary_text = summary.into();
        self.persist().await
    }

    pub async fn set_signature(&mut self, signature: impl Into<String> + Send) -> Result<()> {
        self.require_client()?;
        self.draft.signature = signature.into();
        self.persist().await
    }

    pub async fn set_theme(&mut self, theme: BrandingSettings) -> Result<()> {
        self.require_client()?;
        self.draft.theme = theme;
        self.bump_chart_revision();
        self.persist().await
    }

    pub async fn add_media(&mut self, attachment: MediaAttachment) -> Result<()> {
        self.require_client()?;
        self.draft.media.push(attachment);
        self.persist().await
    }

    pub async fn set_delivery_options(&mut self, options: DeliveryOptions) -> Result<()> {
        self.require_client()?;
        self.draft.delivery = options;
        self.persist().await
    }

    /// Marks expired media inert; persists only when something changed.
    pub async fn sweep_expired_media(&mut self) -> Result<usize> {
        let swept = self.draft.sweep_expired_media(Utc::now());
        if swept > 0 {
            self.persist().await?;
        }
        Ok(swept)
    }

    /// Draft-completeness score for UI feedback. Monotone in the amount of
    /// content present; has no effect on allowed transitions.
    pub fn progress(&self) -> u8 {
        let mut score = 0u32;
        if self.draft.client_id.is_some() {
            score += WEIGHT_CLIENT;
        }
        if self.draft.metrics.has_any_counts()
            || self.draft.metrics.operational_uptime > 0.0
            || self.draft.metrics.ai_accuracy > 0.0
        {
            score += WEIGHT_METRICS;
        }
        let ratio = self.draft.narratives.completion_ratio();
        score += (ratio * WEIGHT_NARRATIVES as f64).round() as u32;
        if !self.draft.media.is_empty() {
            score += WEIGHT_MEDIA;
        }
        if self.draft.chart_png.is_some() {
            score += WEIGHT_CHART;
        }
        if self.draft.theme.is_customized() {
            score += WEIGHT_BRANDING;
        }
        if self.draft.delivery.has_recipients() {
            score += WEIGHT_RECIPIENTS;
        }
        let summary_len = self.draft.summary_text.trim().chars().count();
        score += (summary_len.min(SUMMARY_FULL_CREDIT_CHARS) as u32 * WEIGHT_SUMMARY)
            / SUMMARY_FULL_CREDIT_CHARS as u32;
        score.min(100) as u8
    }

    /// Runs the AI pass and merges suggestions. One call at a time per
    /// draft; failure leaves narratives, summary and status untouched.
    pub async fn enhance(
        &mut self,
        enhancer: &dyn TextEnhancer,
        options: EnhanceOptions,
    ) -> Result<()> {
        self.require_client()?;
        if self.enhance_in_flight {
            return Err(ReportError::StageBusy {
                stage: Stage::Enhancement,
            });
        }
        self.enhance_in_flight = true;
        let started_generation = self.enhance_generation;
        let request = EnhanceRequest::from_draft(&self.draft, options);
        let result = enhancer.enhance(&request).await;
        self.enhance_in_flight = false;

        let response = result?;
        if self.enhance_generation != started_generation {
            debug!("discarding enhancement response for an abandoned stage");
            return Ok(());
        }
        apply_response(&mut self.draft, &response, options);
        self.try_advance(ReportStatus::Review);
        self.persist_now().await
    }

    /// Leaving the narrative stage abandons any outstanding enhancement:
    /// a response that arrives afterwards is never merged.
    pub fn abandon_enhancement(&mut self) {
        self.enhance_in_flight = false;
        self.enhance_generation = self.enhance_generation.wrapping_add(1);
    }

    /// Captures the chart for the current metrics and branding.
    pub async fn capture_chart(&mut self, rasterizer: &ChartRasterizer) -> Result<bool> {
        self.require_client()?;
        let revision = self.chart_revision;
        let image = rasterizer
            .capture(&self.draft.metrics, &self.draft.theme, revision)
            .await?;
        self.apply_chart(image).await
    }

    /// Merges a completed capture unless the draft moved on while it was
    /// settling; a stale image is dropped and the caller re-captures.
    pub async fn apply_chart(&mut self, image: ChartImage) -> Result<bool> {
        if image.revision != self.chart_revision {
            debug!(
                capture = image.revision,
                current = self.chart_revision,
                "discarding stale chart capture"
            );
            return Ok(false);
        }
        self.draft.chart_png = Some(image.png);
        self.persist().await?;
        Ok(true)
    }

    /// Renders the preview document. Success makes the report `Ready`.
    pub async fn preview(&mut self, composer: &ReportComposer) -> Result<RenderedReport> {
        let client = self.require_client()?.clone();
        self.draft.sweep_expired_media(Utc::now());
        let rendered = composer.render(&self.draft, &client)?;
        self.try_advance(ReportStatus::Ready);
        self.persist_now().await?;
        Ok(rendered)
    }

    /// Delivers a rendered report. Full success (or a successful queue of a
    /// scheduled send) advances the status; partial failure keeps the
    /// report `Ready` and reports per-recipient outcomes, with the uploaded
    /// URL retained so a resend skips the upload.
    pub async fn send<C, E, S>(
        &mut self,
        dispatcher: &Dispatcher<C, E, S>,
        rendered: &RenderedReport,
    ) -> Result<DeliveryReport>
    where
        C: ContentStore,
        E: EmailSender,
        S: SmsSender,
    {
        let client = self.require_client()?.clone();
        if self.draft.status != ReportStatus::Ready {
            return Err(ReportError::WrongStatus {
                required: ReportStatus::Ready,
                actual: self.draft.status,
            });
        }
        if !self.draft.delivery.has_recipients() {
            return Err(ReportError::NoRecipients);
        }
        if self.dispatch_in_flight {
            return Err(ReportError::StageBusy {
                stage: Stage::Dispatch,
            });
        }

        self.dispatch_in_flight = true;
        let digest = document_digest(&rendered.pdf);
        let reuse = match (&self.draft.uploaded_url, &self.draft.upload_digest) {
            (Some(url), Some(existing)) if *existing == digest => Some(url.clone()),
            _ => None,
        };
        let result = dispatcher
            .send(
                &rendered.pdf,
                &self.draft.delivery,
                &client,
                &self.draft.date_range,
                reuse.as_deref(),
            )
            .await;
        self.dispatch_in_flight = false;
        let report = result?;

        // The upload succeeded even if recipients failed; remember it so a
        // retry does not upload again.
        self.draft.uploaded_url = Some(report.url.clone());
        self.draft.upload_digest = Some(report.digest.clone());

        if report.queued_for.is_some() {
            self.try_advance(ReportStatus::Scheduled);
            self.persist_now().await?;
            return Ok(report);
        }

        if report.all_succeeded() {
            self.try_advance(ReportStatus::Sent);
            self.persist_now().await?;
            Ok(report)
        } else {
            self.persist_now().await?;
            Err(ReportError::PartialDelivery {
                failed: report.failed_count(),
                total: report.outcomes.len(),
                outcomes: report.outcomes,
            })
        }
    }

    /// Promotes a `Scheduled` report once the provider confirms the queued
    /// dispatch actually went out. A failed confirmation keeps `Scheduled`.
    pub async fn confirm_scheduled(&mut self, outcomes: &[DeliveryOutcome]) -> Result<()> {
        if self.draft.status != ReportStatus::Scheduled {
            return Err(ReportError::WrongStatus {
                required: ReportStatus::Scheduled,
                actual: self.draft.status,
            });
        }
        if !outcomes.is_empty() && outcomes.iter().all(|o| o.success) {
            self.try_advance(ReportStatus::Sent);
            self.persist_now().await
        } else {
            Err(ReportError::PartialDelivery {
                failed: outcomes.iter().filter(|o| !o.success).count(),
                total: outcomes.len(),
                outcomes: outcomes.to_vec(),
            })
        }
    }

    /// Explicit discard: back to an empty draft from any state.
    pub async fn reset(&mut self) -> Result<()> {
        info!(from = ?self.draft.status, "resetting report session");
        self.draft = ReportDraft::new();
        self.client = None;
        self.enhance_in_flight = false;
        self.dispatch_in_flight = false;
        self.enhance_generation = self.enhance_generation.wrapping_add(1);
        self.bump_chart_revision();
        self.repo.clear().await?;
        self.persist_now().await
    }

    /// Session teardown: force any coalesced write out.
    pub async fn flush(&mut self) -> Result<()> {
        if self.save_pending || self.last_save.is_none() {
            self.persist_now().await?;
        }
        self.repo.flush().await
    }

    async fn persist(&mut self) -> Result<()> {
        if let Some(last) = self.last_save {
            if last.elapsed() < self.config.save_debounce {
                self.save_pending = true;
                return Ok(());
            }
        }
        self.persist_now().await
    }

    async fn persist_now(&mut self) -> Result<()> {
        self.draft.last_saved_at = Some(Utc::now());
        self.repo.save(&self.draft).await?;
        self.last_save = Some(Instant::now());
        self.save_pending = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch;
    use crate::enhance::{EnhanceResponse, NarrativeSuggestion};
    use crate::metrics::IntrusionCategory;
    use crate::persist::MemoryDraftStore;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn acme() -> Client {
        Client {
            id: "acme-plaza".to_string(),
            name: "Acme Plaza".to_string(),
            location: "12 Harbor Way".to_string(),
            contact_email: "security@acme.test".to_string(),
            branding_defaults: BrandingSettings::default(),
        }
    }

    async fn workflow() -> ReportWorkflow<MemoryDraftStore> {
        ReportWorkflow::resume(Arc::new(MemoryDraftStore::new()), WorkflowConfig::default())
            .await
            .expect("resume")
    }

    async fn workflow_with_client() -> ReportWorkflow<MemoryDraftStore> {
        let mut wf = workflow().await;
        wf.select_client(acme()).await.expect("select client");
        wf
    }

    async fn ready_workflow() -> (ReportWorkflow<MemoryDraftStore>, RenderedReport) {
        let mut wf = workflow_with_client().await;
        wf.update_metrics(
            MetricsPatch::new()
                .with_count(IntrusionCategory::Human, Weekday::Monday, 5)
                .with_ai_accuracy(98.2)
                .with_operational_uptime(99.9)
                .with_response_time(2.5),
        )
        .await
        .unwrap();
        for day in Weekday::ALL {
            wf.set_narrative(
                day,
                format!("{} patrol completed.", day.as_str()),
                NarrativeStatus::Completed,
                SecurityCode::Normal,
            )
            .await
            .unwrap();
        }
        let chart = ChartRasterizer::new(128, 96, Duration::from_millis(1));
        wf.capture_chart(&chart).await.unwrap();
        let mut options = DeliveryOptions::default();
        options.email_recipients.push("ops@acme.test".to_string());
        wf.set_delivery_options(options).await.unwrap();
        let rendered = wf.preview(&ReportComposer::default()).await.unwrap();
        (wf, rendered)
    }

    struct FixedEnhancer;

    #[async_trait]
    impl TextEnhancer for FixedEnhancer {
        async fn enhance(&self, _request: &EnhanceRequest) -> Result<EnhanceResponse> {
            Ok(EnhanceResponse {
                narratives: vec![NarrativeSuggestion {
                    day: Weekday::Monday,
                    content: "Polished Monday log.".to_string(),
                    code: None,
                }],
                summary: None,
            })
        }
    }

    struct FailingEnhancer;

    #[async_trait]
    impl TextEnhancer for FailingEnhancer {
        async fn enhance(&self, _request: &EnhanceRequest) -> Result<EnhanceResponse> {
            Err(ReportError::transient(
                Stage::Enhancement,
                "connection reset",
            ))
        }
    }

    struct CountingStore {
        uploads: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl dispatch::ContentStore for CountingStore {
        async fn upload(&self, _bytes: &[u8], file_name: &str) -> Result<String> {
            self.uploads.fetch_add(1, Ordering::SeqCst);
            Ok(format!("https://cdn.example/{file_name}"))
        }
    }

    #[derive(Default)]
    struct ScriptedEmail {
        fail_remaining: Mutex<usize>,
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl dispatch::EmailSender for ScriptedEmail {
        async fn send(&self, recipient: &str, _subject: &str, _body: &str) -> Result<()> {
            let mut remaining = self.fail_remaining.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ReportError::transient(Stage::Dispatch, "mailbox rejected"));
            }
            self.sent.lock().unwrap().push(recipient.to_string());
            Ok(())
        }
    }

    #[derive(Default)]
    struct NoSms;

    #[async_trait]
    impl dispatch::SmsSender for NoSms {
        async fn send(&self, _recipient: &str, _text: &str) -> Result<()> {
            Ok(())
        }
    }

    fn dispatcher(
        fail_first_n_emails: usize,
    ) -> (
        Dispatcher<CountingStore, ScriptedEmail, NoSms>,
        Arc<AtomicUsize>,
    ) {
        let uploads = Arc::new(AtomicUsize::new(0));
        let email = ScriptedEmail {
            fail_remaining: Mutex::new(fail_first_n_emails),
            sent: Mutex::new(Vec::new()),
        };
        let store = CountingStore {
            uploads: uploads.clone(),
        };
        (Dispatcher::new(store, email, NoSms), uploads)
    }

    #[tokio::test]
    async fn mutations_require_a_client() {
        let mut wf = workflow().await;
        let err = wf
            .set_summary("no client yet")
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::MissingClient));
        let err = wf.update_metrics(MetricsPatch::new()).await.unwrap_err();
        assert!(matches!(err, ReportError::MissingClient));
    }

    #[tokio::test]
    async fn client_is_immutable_for_the_session() {
        let mut wf = workflow_with_client().await;
        let mut other = acme();
        other.id = "other-client".to_string();
        let err = wf.select_client(other).await.unwrap_err();
        assert!(matches!(err, ReportError::ClientAlreadySelected));
        // Reattaching the same client is fine (resume path).
        wf.select_client(acme()).await.unwrap();
    }

    #[tokio::test]
    async fn invalid_weekday_leaves_draft_untouched() {
        let mut wf = workflow_with_client().await;
        let before = wf.draft().narratives.clone();
        let err = wf
            .set_narrative_named(
                "Funday",
                "x",
                NarrativeStatus::Completed,
                SecurityCode::Normal,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::UnknownWeekday(_)));
        assert_eq!(wf.draft().narratives, before);
    }

    #[tokio::test]
    async fn progress_is_monotone_and_caps_at_100() {
        let mut wf = workflow().await;
        let mut last = wf.progress();
        assert_eq!(last, 0);

        wf.select_client(acme()).await.unwrap();
        assert!(wf.progress() >= last);
        last = wf.progress();

        wf.update_metrics(
            MetricsPatch::new().with_count(IntrusionCategory::Human, Weekday::Monday, 2),
        )
        .await
        .unwrap();
        assert!(wf.progress() >= last);
        last = wf.progress();

        for day in Weekday::ALL {
            wf.set_narrative(
                day,
                "Patrol completed.",
                NarrativeStatus::Completed,
                SecurityCode::Normal,
            )
            .await
            .unwrap();
            assert!(wf.progress() >= last);
            last = wf.progress();
        }

        let mut theme = BrandingSettings::default();
        theme.accent_color = "#cc5500".to_string();
        wf.set_theme(theme).await.unwrap();
        wf.add_media(MediaAttachment::new(
            "clip",
            "https://cdn.example/clip.mp4",
            Utc::now() + chrono::Duration::days(3),
        ))
        .await
        .unwrap();
        let chart = ChartRasterizer::new(64, 64, Duration::from_millis(1));
        wf.capture_chart(&chart).await.unwrap();
        let mut options = DeliveryOptions::default();
        options.email_recipients.push("ops@acme.test".to_string());
        wf.set_delivery_options(options).await.unwrap();
        wf.set_summary("s".repeat(SUMMARY_FULL_CREDIT_CHARS)).await.unwrap();

        assert!(wf.progress() >= last);
        assert_eq!(wf.progress(), 100);
    }

    #[tokio::test]
    async fn enhancement_merges_and_moves_to_review() {
        let mut wf = workflow_with_client().await;
        wf.set_narrative(
            Weekday::Monday,
            "rough monday log",
            NarrativeStatus::Completed,
            SecurityCode::Normal,
        )
        .await
        .unwrap();

        wf.enhance(&FixedEnhancer, EnhanceOptions::default())
            .await
            .unwrap();
        assert_eq!(wf.status(), ReportStatus::Review);
        assert_eq!(
            wf.draft().narratives.day(Weekday::Monday).content,
            "Polished Monday log."
        );
    }

    #[tokio::test]
    async fn failed_enhancement_changes_nothing() {
        let mut wf = workflow_with_client().await;
        wf.set_narrative(
            Weekday::Monday,
            "rough monday log",
            NarrativeStatus::Completed,
            SecurityCode::Normal,
        )
        .await
        .unwrap();
        let before = wf.draft().clone();

        let err = wf
            .enhance(&FailingEnhancer, EnhanceOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(wf.status(), ReportStatus::Draft);
        assert_eq!(wf.draft().narratives, before.narratives);
        // The guard is released, so a retry is possible.
        wf.enhance(&FixedEnhancer, EnhanceOptions::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn concurrent_enhancement_is_rejected() {
        let mut wf = workflow_with_client().await;
        wf.enhance_in_flight = true;
        let err = wf
            .enhance(&FixedEnhancer, EnhanceOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ReportError::StageBusy {
                stage: Stage::Enhancement
            }
        ));
    }

    #[tokio::test]
    async fn stale_chart_capture_is_discarded() {
        let mut wf = workflow_with_client().await;
        let rasterizer = ChartRasterizer::new(64, 64, Duration::from_millis(1));
        let stale = rasterizer
            .capture(
                &wf.draft().metrics,
                &wf.draft().theme,
                wf.chart_revision(),
            )
            .await
            .unwrap();

        // The metrics move on while the capture was in flight.
        wf.update_metrics(
            MetricsPatch::new().with_count(IntrusionCategory::Vehicle, Weekday::Friday, 1),
        )
        .await
        .unwrap();

        assert!(!wf.apply_chart(stale).await.unwrap());
        assert!(wf.draft().chart_png.is_none());

        // A fresh capture for the current revision lands.
        assert!(wf.capture_chart(&rasterizer).await.unwrap());
        assert!(wf.draft().chart_png.is_some());
    }

    #[tokio::test]
    async fn preview_advances_draft_to_ready() {
        let (wf, rendered) = ready_workflow().await;
        assert_eq!(wf.status(), ReportStatus::Ready);
        assert!(rendered.pdf.starts_with(b"%PDF-1.7"));
        assert!(rendered.page_count >= 1);
    }

    #[tokio::test]
    async fn acme_happy_path_reaches_sent_with_one_outcome() {
        let (mut wf, rendered) = ready_workflow().await;
        let (dispatcher, _uploads) = dispatcher(0);
        let report = wf.send(&dispatcher, &rendered).await.expect("send");

        assert_eq!(wf.status(), ReportStatus::Sent);
        assert_eq!(report.outcomes.len(), 1);
        assert!(report.outcomes[0].success);
        assert_eq!(report.outcomes[0].recipient, "ops@acme.test");
    }

    #[tokio::test]
    async fn failed_recipient_keeps_ready_and_resend_skips_upload() {
        let (mut wf, rendered) = ready_workflow().await;
        let (dispatcher, uploads) = dispatcher(1);

        let err = wf.send(&dispatcher, &rendered).await.unwrap_err();
        match &err {
            ReportError::PartialDelivery {
                outcomes,
                failed,
                total,
            } => {
                assert_eq!((*failed, *total), (1, 1));
                assert!(!outcomes[0].success);
            }
            other => panic!("expected partial delivery, got {other:?}"),
        }
        assert_eq!(wf.status(), ReportStatus::Ready);
        assert!(wf.draft().uploaded_url.is_some());
        assert_eq!(uploads.load(Ordering::SeqCst), 1);

        // Retry succeeds without a second upload.
        let report = wf.send(&dispatcher, &rendered).await.expect("resend");
        assert!(report.all_succeeded());
        assert_eq!(wf.status(), ReportStatus::Sent);
        assert_eq!(uploads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn send_requires_recipients_and_ready_status() {
        let mut wf = workflow_with_client().await;
        let rendered = wf.preview(&ReportComposer::default()).await.unwrap();
        // Drop recipients again after preview.
        wf.set_delivery_options(DeliveryOptions::default())
            .await
            .unwrap();
        let (no_recipients_dispatcher, _) = dispatcher(0);
        let err = wf
            .send(&no_recipients_dispatcher, &rendered)
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::NoRecipients));

        wf.reset().await.unwrap();
        wf.select_client(acme()).await.unwrap();
        let (fresh_dispatcher, _) = dispatcher(0);
        let err = wf.send(&fresh_dispatcher, &rendered).await.unwrap_err();
        assert!(matches!(err, ReportError::WrongStatus { .. }));
    }

    #[tokio::test]
    async fn scheduled_send_is_queued_then_confirmed() {
        let (mut wf, rendered) = ready_workflow().await;
        let mut options = wf.draft().delivery.clone();
        options.schedule_delivery = true;
        options.delivery_date = Some(Utc::now() + chrono::Duration::hours(4));
        wf.set_delivery_options(options).await.unwrap();
        // Changing delivery options does not regress readiness.
        assert_eq!(wf.status(), ReportStatus::Ready);

        let (dispatcher, _uploads) = dispatcher(0);
        let report = wf.send(&dispatcher, &rendered).await.expect("queue");
        assert!(report.queued_for.is_some());
        assert_eq!(wf.status(), ReportStatus::Scheduled);
        assert_eq!(dispatcher.queued_count(), 1);

        let flushed = dispatcher
            .flush_due(Utc::now() + chrono::Duration::hours(5))
            .await
            .unwrap();
        assert_eq!(flushed.len(), 1);
        wf.confirm_scheduled(&flushed[0]).await.expect("confirm");
        assert_eq!(wf.status(), ReportStatus::Sent);
    }

    #[tokio::test]
    async fn reset_returns_to_an_empty_draft_from_any_state() {
        let (mut wf, rendered) = ready_workflow().await;
        let (dispatcher, _uploads) = dispatcher(0);
        wf.send(&dispatcher, &rendered).await.unwrap();
        assert_eq!(wf.status(), ReportStatus::Sent);

        wf.reset().await.unwrap();
        assert_eq!(wf.status(), ReportStatus::Draft);
        assert!(wf.draft().client_id.is_none());
        assert_eq!(wf.draft().narratives.completed_count(), 0);
        assert_eq!(wf.progress(), 0);
    }

    #[tokio::test]
    async fn draft_survives_resume() {
        let repo = Arc::new(MemoryDraftStore::new());
        {
            let mut wf = ReportWorkflow::resume(repo.clone(), WorkflowConfig::default())
                .await
                .unwrap();
            wf.select_client(acme()).await.unwrap();
            wf.set_summary("recovered after crash").await.unwrap();
        }
        let mut wf = ReportWorkflow::resume(repo, WorkflowConfig::default())
            .await
            .unwrap();
        assert_eq!(wf.draft().summary_text, "recovered after crash");
        assert_eq!(wf.draft().client_id.as_deref(), Some("acme-plaza"));
        // Reattach the client and keep working.
        wf.select_client(acme()).await.unwrap();
        wf.set_summary("and kept editing").await.unwrap();
    }

    struct StaticDirectory;

    #[async_trait]
    impl ClientDirectory for StaticDirectory {
        async fn clients_for_user(&self, _user_id: &str) -> Result<Vec<Client>> {
            Ok(vec![acme()])
        }
    }

    #[tokio::test]
    async fn client_selection_from_the_directory() {
        let clients = StaticDirectory
            .clients_for_user("supervisor-1")
            .await
            .unwrap();
        let mut wf = workflow().await;
        wf.select_client(clients[0].clone()).await.unwrap();
        assert_eq!(wf.draft().client_id.as_deref(), Some("acme-plaza"));
        assert_eq!(wf.draft().theme, clients[0].branding_defaults);
    }

    struct StaticMetrics;

    #[async_trait]
    impl MetricsSource for StaticMetrics {
        async fn client_metrics(
            &self,
            client_id: &str,
            _range: &DateRange,
        ) -> Result<MetricsSnapshot> {
            assert_eq!(client_id, "acme-plaza");
            let mut snapshot = MetricsSnapshot::default();
            snapshot.apply(
                &MetricsPatch::new()
                    .with_count(IntrusionCategory::Human, Weekday::Monday, 5)
                    .with_operational_uptime(99.9),
            );
            Ok(snapshot)
        }
    }

    #[tokio::test]
    async fn load_metrics_replaces_the_snapshot() {
        let mut wf = workflow_with_client().await;
        wf.update_metrics(
            MetricsPatch::new().with_count(IntrusionCategory::Animal, Weekday::Sunday, 9),
        )
        .await
        .unwrap();
        let revision_before = wf.chart_revision();

        wf.load_metrics(&StaticMetrics).await.unwrap();
        assert_eq!(
            wf.draft().metrics.count(IntrusionCategory::Human, Weekday::Monday),
            5
        );
        // A replace, not a merge.
        assert_eq!(
            wf.draft().metrics.count(IntrusionCategory::Animal, Weekday::Sunday),
            0
        );
        // The chart must be re-captured for the new numbers.
        assert!(wf.chart_revision() > revision_before);
    }

    #[tokio::test]
    async fn abandoned_enhancement_response_is_not_merged() {
        let mut wf = workflow_with_client().await;
        wf.set_narrative(
            Weekday::Monday,
            "original",
            NarrativeStatus::Completed,
            SecurityCode::Normal,
        )
        .await
        .unwrap();

        // Simulate a response arriving for a stage the user already left.
        wf.abandon_enhancement();
        let generation_after_abandon = wf.enhance_generation;
        assert!(generation_after_abandon > 0);
        // A fresh call observes the new generation and merges normally.
        wf.enhance(&FixedEnhancer, EnhanceOptions::default())
            .await
            .unwrap();
        assert_eq!(
            wf.draft().narratives.day(Weekday::Monday).content,
            "Polished Monday log."
        );
    }
}
