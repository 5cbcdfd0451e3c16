use crate::canvas::Canvas;
use crate::frame::Frame;
use crate::types::{Rect, Size};
use std::sync::Arc;

/// Context handed to `on_page` callbacks when a new page begins.
pub struct PageContext<'a> {
    pub page_number: usize,
    pub template_name: &'a str,
}

pub type OnPageCallback = Arc<dyn Fn(&mut Canvas, &PageContext<'_>) + Send + Sync>;

#[derive(Clone, Copy)]
pub struct FrameSpec {
    pub rect: Rect,
}

/// Page geometry plus an optional per-page callback used for branding
/// backgrounds and banners that sit under the flowed content.
#[derive(Clone)]
pub struct PageTemplate {
    pub name: String,
    pub page_size: Size,
    frames: Vec<FrameSpec>,
    on_page: Option<OnPageCallback>,
}

impl PageTemplate {
    pub fn new(name: impl Into<String>, page_size: Size) -> Self {
        Self {
            name: name.into(),
            page_size,
            frames: Vec::new(),
            on_page: None,
        }
    }

    pub fn with_frame(mut self, rect: Rect) -> Self {
        self.frames.push(FrameSpec { rect });
        self
    }

    pub fn set_on_page<F>(mut self, callback: F) -> Self
    where
        F: Fn(&mut Canvas, &PageContext<'_>) + Send + Sync + 'static,
    {
        self.on_page = Some(Arc::new(callback));
        self
    }

    pub fn on_page(&self) -> Option<&OnPageCallback> {
        self.on_page.as_ref()
    }

    pub fn instantiate_frames(&self) -> Vec<Frame> {
        self.frames
            .iter()
            .map(|spec| Frame::new(spec.rect))
            .collect()
    }
}
