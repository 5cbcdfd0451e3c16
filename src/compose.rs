use crate::doc_template::{DocTemplate, DocumentMetrics, PageFooterSpec};
use crate::error::Result;
use crate::flowable::{
    ImageFlowable, Paragraph, Spacer, TableColumn, TableFlowable, TextAlign, TextStyle,
};
use crate::metrics::{IntrusionCategory, MetricsSnapshot};
use crate::model::{Client, ReportDraft};
use crate::page_template::PageTemplate;
use crate::pdf::{self, ImageRegistry, PdfOptions};
use crate::types::{Color, Margins, Pt, Rect, Size};

const CHART_RESOURCE: &str = "weekly-chart";
const ACCENT_BAND_HEIGHT: f32 = 6.0;
const CHART_WIDTH_PT: f32 = 360.0;
const CHART_HEIGHT_PT: f32 = 180.0;

/// A finished render. `pdf` is the final artifact: the same bytes serve as
/// the download and as the upload payload.
#[derive(Debug, Clone)]
pub struct RenderedReport {
    pub pdf: Vec<u8>,
    pub page_count: usize,
    pub metrics: DocumentMetrics,
}

/// Maps a draft to a paginated, branded document. Owns no draft state:
/// branding is consumed read-only from the draft's theme.
#[derive(Debug, Clone)]
pub struct ReportComposer {
    page_size: Size,
    margins: Margins,
}

impl Default for ReportComposer {
    fn default() -> Self {
        Self {
            page_size: Size::a4(),
            margins: Margins::all(54.0),
        }
    }
}

impl ReportComposer {
    pub fn new(page_size: Size, margins: Margins) -> Self {
        Self { page_size, margins }
    }

    pub fn render(&self, draft: &ReportDraft, client: &Client) -> Result<RenderedReport> {
        let registry = self.image_registry(draft);
        let (document, metrics) = self.layout(draft, client, &registry)?;
        let options = PdfOptions {
            document_title: Some(format!("{} - Weekly Security Report", client.name)),
        };
        let pdf = pdf::write_document(&document, &registry, &options)?;
        Ok(RenderedReport {
            page_count: document.pages.len(),
            pdf,
            metrics,
        })
    }

    /// Same render, bytes only. Byte-identical to `render(..).pdf`.
    pub fn render_bytes(&self, draft: &ReportDraft, client: &Client) -> Result<Vec<u8>> {
        Ok(self.render(draft, client)?.pdf)
    }

    fn image_registry(&self, draft: &ReportDraft) -> ImageRegistry {
        let mut registry = ImageRegistry::new();
        if let Some(png) = &draft.chart_png {
            registry.register(CHART_RESOURCE, png.clone());
        }
        registry
    }

    fn content_frame(&self) -> Rect {
        Rect {
            x: self.margins.left,
            y: self.margins.top,
            width: (self.page_size.width - self.margins.left - self.margins.right)
                .max(Pt::from_f32(1.0)),
            height: (self.page_size.height - self.margins.top - self.margins.bottom)
                .max(Pt::from_f32(1.0)),
        }
    }

    fn layout(
        &self,
        draft: &ReportDraft,
        client: &Client,
        registry: &ImageRegistry,
    ) -> Result<(crate::canvas::Document, DocumentMetrics)> {
        let theme = draft.theme.clone();
        let page_size = self.page_size;

        // Per-page branding drawn under the flowed content: optional
        // background image at reduced opacity, plus an accent band.
        let background = theme
            .background_image
            .clone()
            .filter(|reference| registry.contains(reference) || registry.resolve(reference).is_ok());
        let band_color = theme.accent_color();
        let opacity = theme.background_opacity();
        let template = PageTemplate::new("report", page_size)
            .with_frame(self.content_frame())
            .set_on_page(move |canvas, _ctx| {
                if let Some(reference) = &background {
                    canvas.save_state();
                    canvas.set_opacity(opacity, opacity);
                    canvas.draw_image(
                        Pt::ZERO,
                        Pt::ZERO,
                        page_size.width,
                        page_size.height,
                        reference.clone(),
                    );
                    canvas.restore_state();
                }
                canvas.set_fill_color(band_color);
                canvas.draw_rect(
                    Pt::ZERO,
                    Pt::ZERO,
                    page_size.width,
                    Pt::from_f32(ACCENT_BAND_HEIGHT),
                );
                canvas.fill();
            });

        let mut doc = DocTemplate::new(vec![template]).with_footer(PageFooterSpec::page_of(
            self.margins.left,
            self.margins.bottom / 2,
        ));

        let header_color = theme.header_color();
        let text_color = theme.text_color();
        let muted = Color::rgb(0.45, 0.45, 0.45);

        // Header block: logo, title, client line, date-range subtitle.
        if let Some(logo) = &theme.logo {
            if registry.contains(logo) || registry.resolve(logo).is_ok() {
                doc.add_flowable(Box::new(ImageFlowable::new(64.0, 64.0, logo.clone())));
                doc.add_flowable(Box::new(Spacer::new(8.0)));
            }
        }
        doc.add_flowable(Box::new(
            Paragraph::new("Weekly Security Report")
                .with_style(TextStyle::bold(20.0).with_color(header_color)),
        ));
        doc.add_flowable(Box::new(
            Paragraph::new(format!("{} \u{2014} {}", client.name, client.location))
                .with_style(TextStyle::sized(12.0).with_color(text_color)),
        ));
        doc.add_flowable(Box::new(
            Paragraph::new(draft.date_range.label())
                .with_style(TextStyle::sized(11.0).with_color(muted)),
        ));
        doc.add_flowable(Box::new(Spacer::new(18.0)));

        // Metrics summary table.
        doc.add_flowable(Box::new(self.metrics_table(&draft.metrics, &theme)));

        // Chart sits directly below the table; the flowable cursor already
        // accounts for however many rows the table produced.
        if draft.delivery.include_chart && draft.chart_png.is_some() {
            doc.add_flowable(Box::new(Spacer::new(14.0)));
            doc.add_flowable(Box::new(
                ImageFlowable::new(CHART_WIDTH_PT, CHART_HEIGHT_PT, CHART_RESOURCE)
                    .with_align(TextAlign::Center),
            ));
        }
        doc.add_flowable(Box::new(Spacer::new(18.0)));

        // Daily narratives: only days with content, each prefixed by its
        // security code line.
        for entry in draft.narratives.iter() {
            if !entry.is_complete() {
                continue;
            }
            doc.add_flowable(Box::new(
                Paragraph::new(format!(
                    "{} \u{2014} Security Code: {}",
                    entry.day.as_str(),
                    entry.code.label()
                ))
                .with_style(TextStyle::bold(12.0).with_color(header_color)),
            ));
            doc.add_flowable(Box::new(
                Paragraph::new(entry.content.clone())
                    .with_style(TextStyle::sized(11.0).with_color(text_color)),
            ));
            doc.add_flowable(Box::new(Spacer::new(10.0)));
        }

        // Evidence links, excluding anything expired.
        if draft.delivery.include_media && draft.active_media().next().is_some() {
            doc.add_flowable(Box::new(Spacer::new(8.0)));
            doc.add_flowable(Box::new(
                Paragraph::new("Evidence & Media")
                    .with_style(TextStyle::bold(12.0).with_color(header_color)),
            ));
            for item in draft.active_media() {
                doc.add_flowable(Box::new(
                    Paragraph::new(format!(
                        "\u{2022} {} \u{2014} {} (available until {})",
                        item.label,
                        item.reference,
                        item.expires_at.format("%b %-d, %Y")
                    ))
                    .with_style(TextStyle::sized(10.0).with_color(text_color)),
                ));
            }
        }

        // Summary and compliance notes.
        if !draft.summary_text.trim().is_empty() {
            doc.add_flowable(Box::new(Spacer::new(8.0)));
            doc.add_flowable(Box::new(
                Paragraph::new("Weekly Summary")
                    .with_style(TextStyle::bold(12.0).with_color(header_color)),
            ));
            doc.add_flowable(Box::new(
                Paragraph::new(draft.summary_text.clone())
                    .with_style(TextStyle::sized(11.0).with_color(text_color)),
            ));
        }

        // Signature line lands on whatever the final page turns out to be.
        if !draft.signature.trim().is_empty() {
            doc.add_flowable(Box::new(Spacer::new(28.0)));
            doc.add_flowable(Box::new(
                Paragraph::new(draft.signature.clone())
                    .with_style(TextStyle::sized(11.0).with_color(text_color)),
            ));
            doc.add_flowable(Box::new(
                Paragraph::new("Authorized signature")
                    .with_style(TextStyle::sized(9.0).with_color(muted)),
            ));
        }

        doc.build_with_metrics()
    }

    fn metrics_table(&self, metrics: &MetricsSnapshot, theme: &crate::style::BrandingSettings) -> TableFlowable {
        let mut rows: Vec<Vec<String>> = IntrusionCategory::ALL
            .into_iter()
            .map(|category| {
                vec![
                    category.label().to_string(),
                    metrics.weekly_total(category).to_string(),
                ]
            })
            .collect();
        rows.push(vec![
            "AI Detection Accuracy".to_string(),
            format_percent(metrics.ai_accuracy),
        ]);
        rows.push(vec![
            "Operational Uptime".to_string(),
            format_percent(metrics.operational_uptime),
        ]);
        rows.push(vec![
            "Avg. Response Time".to_string(),
            format_seconds(metrics.response_time_secs),
        ]);

        let mut style = crate::flowable::TableStyle::default();
        style.header_fill = theme.header_color();
        TableFlowable::new(
            vec![
                TableColumn::new("Metric", 0.65),
                TableColumn::new("Weekly Total", 0.35),
            ],
            rows,
        )
        .with_style(style)
    }
}

/// Percentages and durations are printed at fixed two-decimal precision;
/// a missing value has already defaulted to zero upstream, so cells are
/// never blank.
fn format_percent(value: f64) -> String {
    format!("{value:.2}%")
}

fn format_seconds(value: f64) -> String {
    format!("{value:.2}s")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Command;
    use crate::metrics::MetricsPatch;
    use crate::narrative::{NarrativeStatus, SecurityCode, Weekday};
    use crate::style::BrandingSettings;

    fn test_client() -> Client {
        Client {
            id: "acme-plaza".to_string(),
            name: "Acme Plaza".to_string(),
            location: "12 Harbor Way".to_string(),
            contact_email: "security@acme.test".to_string(),
            branding_defaults: BrandingSettings::default(),
        }
    }

    fn draft_for_acme() -> ReportDraft {
        let mut draft = ReportDraft::new();
        draft.client_id = Some("acme-plaza".to_string());
        draft.metrics.apply(
            &MetricsPatch::new()
                .with_count(IntrusionCategory::Human, Weekday::Monday, 5)
                .with_ai_accuracy(98.2)
                .with_operational_uptime(99.9)
                .with_response_time(2.5),
        );
        for day in Weekday::ALL {
            draft.narratives.set_day(
                day,
                format!("{} patrol completed without incident.", day.as_str()),
                NarrativeStatus::Completed,
                SecurityCode::Normal,
            );
        }
        draft.summary_text = "A quiet week with one elevated event on Monday.".to_string();
        draft.signature = "R. Alvarez, Site Supervisor".to_string();
        draft
    }

    fn all_text(document: &crate::canvas::Document) -> String {
        document
            .pages
            .iter()
            .flat_map(|p| p.commands.iter())
            .filter_map(|cmd| match cmd {
                Command::DrawString { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn renders_full_draft_to_pdf() {
        let composer = ReportComposer::default();
        let rendered = composer
            .render(&draft_for_acme(), &test_client())
            .expect("render");
        assert!(rendered.pdf.starts_with(b"%PDF-1.7"));
        assert!(rendered.page_count >= 1);
        assert_eq!(rendered.metrics.pages.len(), rendered.page_count);
    }

    #[test]
    fn download_and_upload_bytes_are_identical() {
        let composer = ReportComposer::default();
        let draft = draft_for_acme();
        let client = test_client();
        let a = composer.render(&draft, &client).unwrap().pdf;
        let b = composer.render_bytes(&draft, &client).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn layout_contains_totals_codes_and_footer() {
        let composer = ReportComposer::default();
        let draft = draft_for_acme();
        let registry = composer.image_registry(&draft);
        let (document, _) = composer
            .layout(&draft, &test_client(), &registry)
            .expect("layout");
        let text = all_text(&document);

        assert!(text.contains("Weekly Security Report"));
        assert!(text.contains("Human Intrusions"));
        // 5 Monday human events, zero elsewhere.
        assert!(text.contains('5'));
        assert!(text.contains("98.20%"));
        assert!(text.contains("99.90%"));
        assert!(text.contains("2.50s"));
        assert!(text.contains("Security Code: Normal"));
        assert!(text.contains("Page 1 of"));
    }

    #[test]
    fn missing_metrics_render_as_zero_not_blank() {
        let composer = ReportComposer::default();
        let mut draft = draft_for_acme();
        draft.metrics = MetricsSnapshot::default();
        let registry = composer.image_registry(&draft);
        let (document, _) = composer
            .layout(&draft, &test_client(), &registry)
            .expect("layout");
        let text = all_text(&document);
        assert!(text.contains("0.00%"));
        assert!(text.contains("0.00s"));
    }

    #[test]
    fn long_narratives_flow_onto_additional_pages() {
        let composer = ReportComposer::default();
        let mut draft = draft_for_acme();
        let long = "Observed and logged routine perimeter activity. ".repeat(120);
        for day in Weekday::ALL {
            draft.narratives.set_day(
                day,
                long.clone(),
                NarrativeStatus::Completed,
                SecurityCode::Advisory,
            );
        }
        let rendered = composer.render(&draft, &test_client()).expect("render");
        assert!(rendered.page_count >= 2);
    }

    #[test]
    fn chart_is_embedded_when_present_and_enabled() {
        let composer = ReportComposer::default();
        let mut draft = draft_for_acme();
        let chart = crate::chart::ChartRasterizer::default()
            .render_png(&draft.metrics, &draft.theme)
            .unwrap();
        draft.chart_png = Some(chart);

        let registry = composer.image_registry(&draft);
        let (document, _) = composer
            .layout(&draft, &test_client(), &registry)
            .expect("layout");
        let has_chart = document.pages.iter().flat_map(|p| &p.commands).any(|cmd| {
            matches!(cmd, Command::DrawImage { resource_id, .. } if resource_id == CHART_RESOURCE)
        });
        assert!(has_chart);

        draft.delivery.include_chart = false;
        let registry = composer.image_registry(&draft);
        let (document, _) = composer
            .layout(&draft, &test_client(), &registry)
            .expect("layout");
        let has_chart = document.pages.iter().flat_map(|p| &p.commands).any(|cmd| {
            matches!(cmd, Command::DrawImage { resource_id, .. } if resource_id == CHART_RESOURCE)
        });
        assert!(!has_chart);
    }

    #[test]
    fn expired_media_is_excluded_from_the_document() {
        use chrono::{Duration, Utc};
        let composer = ReportComposer::default();
        let mut draft = draft_for_acme();
        draft.media.push(crate::model::MediaAttachment::new(
            "gate clip",
            "https://cdn.example/gate.mp4",
            Utc::now() + Duration::days(7),
        ));
        draft.media.push(crate::model::MediaAttachment::new(
            "stale clip",
            "https://cdn.example/stale.mp4",
            Utc::now() - Duration::days(1),
        ));
        draft.sweep_expired_media(Utc::now());

        let registry = composer.image_registry(&draft);
        let (document, _) = composer
            .layout(&draft, &test_client(), &registry)
            .expect("layout");
        let text = all_text(&document);
        assert!(text.contains("gate clip"));
        assert!(!text.contains("stale clip"));
    }
}
