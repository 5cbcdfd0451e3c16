mod canvas;
mod chart;
mod compose;
mod dispatch;
mod doc_template;
mod enhance;
mod error;
mod flowable;
mod frame;
mod metrics;
mod model;
mod narrative;
mod page_template;
mod pdf;
mod persist;
mod style;
mod types;
mod workflow;

pub use canvas::{Canvas, Command, Document, Page};
pub use chart::{ChartImage, ChartRasterizer};
pub use compose::{RenderedReport, ReportComposer};
pub use dispatch::{
    ContentStore, DeliveryReport, Dispatcher, EmailSender, MessageContent, SmsSender,
    compose_messages, document_digest,
};
pub use doc_template::{
    DocTemplate, DocumentMetrics, PageFooterSpec, PageMetrics, apply_page_footer,
    substitute_footer,
};
pub use enhance::{
    EnhanceOptions, EnhanceRequest, EnhanceResponse, HttpTextEnhancer, NarrativeSuggestion,
    TextEnhancer, apply_response,
};
pub use error::{ReportError, Result, Stage};
pub use flowable::{
    BreakAfter, BreakBefore, BreakInside, Flowable, ImageFlowable, Pagination, Paragraph, Spacer,
    TableColumn, TableFlowable, TableStyle, TextAlign, TextStyle,
};
pub use frame::{AddResult, Frame};
pub use metrics::{IntrusionCategory, MetricsPatch, MetricsSnapshot};
pub use model::{
    Channel, Client, DateRange, DeliveryOptions, DeliveryOutcome, MediaAttachment, ReportDraft,
    ReportStatus,
};
pub use narrative::{DailyNarrative, NarrativeSet, NarrativeStatus, SecurityCode, Weekday};
pub use page_template::{FrameSpec, PageContext, PageTemplate};
pub use pdf::{ImageRegistry, PdfOptions, write_document};
pub use persist::{DraftRepository, MemoryDraftStore, SqliteDraftStore};
pub use style::BrandingSettings;
pub use types::{Color, Margins, Pt, Rect, Size};
pub use workflow::{ClientDirectory, MetricsSource, ReportWorkflow, WorkflowConfig};

use std::sync::Arc;
use std::time::Duration;

/// Entry point tying the pipeline together: page geometry for the
/// composer, chart rasterization settings, and workflow persistence
/// behavior, all validated once at construction.
#[derive(Debug)]
pub struct ReportEngine {
    page_size: Size,
    margins: Margins,
    chart: ChartRasterizer,
    workflow_config: WorkflowConfig,
}

impl ReportEngine {
    pub fn builder() -> ReportEngineBuilder {
        ReportEngineBuilder::default()
    }

    pub fn composer(&self) -> ReportComposer {
        ReportComposer::new(self.page_size, self.margins)
    }

    pub fn rasterizer(&self) -> &ChartRasterizer {
        &self.chart
    }

    /// Starts (or resumes) a report session backed by the given repository.
    pub async fn workflow<R: DraftRepository>(&self, repo: Arc<R>) -> Result<ReportWorkflow<R>> {
        ReportWorkflow::resume(repo, self.workflow_config.clone()).await
    }
}

#[derive(Clone)]
pub struct ReportEngineBuilder {
    page_size: Size,
    margins: Margins,
    chart_width: u32,
    chart_height: u32,
    chart_settle: Duration,
    save_debounce: Duration,
}

impl Default for ReportEngineBuilder {
    fn default() -> Self {
        Self {
            page_size: Size::a4(),
            margins: Margins::all(54.0),
            chart_width: 640,
            chart_height: 320,
            chart_settle: Duration::from_millis(150),
            save_debounce: Duration::ZERO,
        }
    }
}

impl ReportEngineBuilder {
    pub fn page_size(mut self, page_size: Size) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn margins(mut self, margins: Margins) -> Self {
        self.margins = margins;
        self
    }

    pub fn chart_size(mut self, width_px: u32, height_px: u32) -> Self {
        self.chart_width = width_px;
        self.chart_height = height_px;
        self
    }

    /// How long a capture waits for the chart to settle before rasterizing.
    pub fn chart_settle(mut self, settle: Duration) -> Self {
        self.chart_settle = settle;
        self
    }

    /// Coalescing window for draft persistence writes.
    pub fn save_debounce(mut self, debounce: Duration) -> Self {
        self.save_debounce = debounce;
        self
    }

    pub fn build(self) -> Result<ReportEngine> {
        let printable_width = self.page_size.width - self.margins.left - self.margins.right;
        let printable_height = self.page_size.height - self.margins.top - self.margins.bottom;
        if printable_width <= Pt::ZERO || printable_height <= Pt::ZERO {
            return Err(ReportError::InvalidConfiguration(
                "margins leave no printable area".to_string(),
            ));
        }
        if self.chart_width == 0 || self.chart_height == 0 {
            return Err(ReportError::InvalidConfiguration(
                "chart dimensions must be positive".to_string(),
            ));
        }
        Ok(ReportEngine {
            page_size: self.page_size,
            margins: self.margins,
            chart: ChartRasterizer::new(self.chart_width, self.chart_height, self.chart_settle),
            workflow_config: WorkflowConfig {
                save_debounce: self.save_debounce,
            },
        })
    }
}
