use crate::canvas::{Canvas, Command, Document};
use crate::error::{ReportError, Result};
use crate::flowable::{BreakAfter, BreakBefore, Flowable};
use crate::frame::AddResult;
use crate::page_template::{PageContext, PageTemplate};
use crate::types::{Color, Pt};
use std::collections::VecDeque;
use std::time::Instant;

#[derive(Debug, Clone, Default)]
pub struct PageMetrics {
    pub page_number: usize,
    pub render_ms: f64,
    pub command_count: usize,
    pub flowable_count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct DocumentMetrics {
    pub total_render_ms: f64,
    pub pages: Vec<PageMetrics>,
}

/// Footer stamped on every page after layout, once the page count is known.
/// `{page}` and `{pages}` are substituted per page.
#[derive(Debug, Clone)]
pub struct PageFooterSpec {
    pub template: String,
    pub font_name: String,
    pub font_size: Pt,
    pub color: Color,
    pub x: Pt,
    pub y_from_bottom: Pt,
}

impl PageFooterSpec {
    pub fn page_of(x: Pt, y_from_bottom: Pt) -> Self {
        Self {
            template: "Page {page} of {pages}".to_string(),
            font_name: "Helvetica".to_string(),
            font_size: Pt::from_f32(9.0),
            color: Color::rgb(0.4, 0.4, 0.4),
            x,
            y_from_bottom,
        }
    }
}

pub fn substitute_footer(template: &str, page: usize, pages: usize) -> String {
    template
        .replace("{page}", &page.to_string())
        .replace("{pages}", &pages.to_string())
}

/// Stamps the footer onto each page. Runs only after the full layout pass,
/// so `{pages}` always equals the emitted page count.
pub fn apply_page_footer(doc: &mut Document, spec: &PageFooterSpec) {
    let total_pages = doc.pages.len();
    if total_pages == 0 {
        return;
    }
    for (idx0, page) in doc.pages.iter_mut().enumerate() {
        let page_number = idx0 + 1;
        let text = substitute_footer(&spec.template, page_number, total_pages);
        // Top-left origin: DrawString y is the top of the text box.
        let y = (doc.page_size.height - spec.y_from_bottom - spec.font_size).max(Pt::ZERO);
        page.commands.push(Command::SetFillColor(spec.color));
        page.commands
            .push(Command::SetFontName(spec.font_name.clone()));
        page.commands.push(Command::SetFontSize(spec.font_size));
        page.commands.push(Command::DrawString { x: spec.x, y, text });
    }
}

/// Lays a story of flowables into pages. Template selection: page 1 uses
/// templates[0], page n uses templates[min(n-1, last)] so the final
/// template repeats for all continuation pages.
pub struct DocTemplate {
    page_templates: Vec<PageTemplate>,
    story: Vec<Box<dyn Flowable>>,
    footer: Option<PageFooterSpec>,
}

impl DocTemplate {
    pub fn new(page_templates: Vec<PageTemplate>) -> Self {
        Self {
            page_templates,
            story: Vec::new(),
            footer: None,
        }
    }

    pub fn add_flowable(&mut self, flowable: Box<dyn Flowable>) {
        self.story.push(flowable);
    }

    pub fn with_footer(mut self, footer: PageFooterSpec) -> Self {
        self.footer = Some(footer);
        self
    }

    pub fn build(self) -> Result<Document> {
        Ok(self.build_with_metrics()?.0)
    }

    pub fn build_with_metrics(self) -> Result<(Document, DocumentMetrics)> {
        if self.page_templates.is_empty() {
            return Err(ReportError::MissingPageTemplate);
        }

        fn select_template(templates: &[PageTemplate], page_number: usize) -> &PageTemplate {
            let idx = page_number.saturating_sub(1).min(templates.len() - 1);
            &templates[idx]
        }

        let start_page = |canvas: &mut Canvas, templates: &[PageTemplate], page_number: usize| {
            let template = select_template(templates, page_number);
            if let Some(callback) = template.on_page() {
                callback(
                    canvas,
                    &PageContext {
                        page_number,
                        template_name: &template.name,
                    },
                );
            }
            template.instantiate_frames()
        };

        let template = select_template(&self.page_templates, 1);
        let mut canvas = Canvas::new(template.page_size);
        let mut page_number = 1usize;
        let mut frames = start_page(&mut canvas, &self.page_templates, page_number);
        let mut frame_index = 0usize;
        let mut placed_on_page = false;
        let mut metrics = DocumentMetrics::default();
        let mut page_start = Instant::now();
        let mut page_flowables = 0usize;

        let finish_page = |canvas: &mut Canvas,
                               page_number: usize,
                               page_flowables: &mut usize,
                               metrics: &mut DocumentMetrics,
                               page_start: &mut Instant| {
            let elapsed = page_start.elapsed().as_secs_f64() * 1000.0;
            metrics.total_render_ms += elapsed;
            metrics.pages.push(PageMetrics {
                page_number,
                render_ms: elapsed,
                command_count: canvas.current_command_count(),
                flowable_count: *page_flowables,
            });
            canvas.show_page();
            *page_flowables = 0;
            *page_start = Instant::now();
        };

        let mut story: VecDeque<Box<dyn Flowable>> = self.story.into_iter().collect();

        while let Some(flowable) = story.pop_front() {
            let mut current = flowable;
            let mut suppress_break_before = false;
            loop {
                let pagination = current.pagination();
                let needs_new_page = (!suppress_break_before
                    && matches!(pagination.break_before, BreakBefore::Page)
                    && placed_on_page)
                    || frame_index >= frames.len();
                if needs_new_page {
                    finish_page(
                        &mut canvas,
                        page_number,
                        &mut page_flowables,
                        &mut metrics,
                        &mut page_start,
                    );
                    page_number += 1;
                    frames = start_page(&mut canvas, &self.page_templates, page_number);
                    frame_index = 0;
                    placed_on_page = false;
                }

                if frames.is_empty() {
                    return Err(ReportError::MissingPageTemplate);
                }

                let is_last_frame = frame_index + 1 >= frames.len();
                let debug_name = current.debug_name();
                let frame = &mut frames[frame_index];
                match frame.add(current, &mut canvas) {
                    AddResult::Placed => {
                        placed_on_page = true;
                        page_flowables += 1;
                        if matches!(pagination.break_after, BreakAfter::Page) {
                            finish_page(
                                &mut canvas,
                                page_number,
                                &mut page_flowables,
                                &mut metrics,
                                &mut page_start,
                            );
                            page_number += 1;
                            frames = start_page(&mut canvas, &self.page_templates, page_number);
                            frame_index = 0;
                            placed_on_page = false;
                        }
                        break;
                    }
                    AddResult::Split(remaining) => {
                        placed_on_page = true;
                        page_flowables += 1;
                        suppress_break_before = true;
                        current = remaining;
                        frame_index += 1;
                    }
                    AddResult::Overflow(remaining) => {
                        if !placed_on_page && is_last_frame {
                            return Err(ReportError::UnplaceableContent(debug_name.to_string()));
                        }
                        suppress_break_before = true;
                        current = remaining;
                        frame_index += 1;
                    }
                }
            }
        }

        if !canvas.is_current_empty() || metrics.pages.is_empty() {
            finish_page(
                &mut canvas,
                page_number,
                &mut page_flowables,
                &mut metrics,
                &mut page_start,
            );
        }

        let mut document = canvas.finish_without_show();
        if let Some(spec) = &self.footer {
            apply_page_footer(&mut document, spec);
        }
        Ok((document, metrics))
    }
}
