use crate::canvas::Canvas;
use crate::flowable::{BreakInside, Flowable};
use crate::types::{Pt, Rect};

pub enum AddResult {
    Placed,
    Split(Box<dyn Flowable>),
    Overflow(Box<dyn Flowable>),
}

/// A rectangular region of a page with a running vertical cursor. Content
/// is placed top-down; whatever does not fit is handed back for the next
/// frame or page.
pub struct Frame {
    rect: Rect,
    cursor_y: Pt,
}

impl Frame {
    pub fn new(rect: Rect) -> Self {
        Self {
            rect,
            cursor_y: Pt::ZERO,
        }
    }

    pub fn remaining_height(&self) -> Pt {
        (self.rect.height - self.cursor_y).max(Pt::ZERO)
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn is_empty(&self) -> bool {
        self.cursor_y <= Pt::ZERO
    }

    pub fn add(&mut self, flowable: Box<dyn Flowable>, canvas: &mut Canvas) -> AddResult {
        let avail_width = self.rect.width;
        let avail_height = self.remaining_height();
        if avail_height <= Pt::ZERO {
            return AddResult::Overflow(flowable);
        }

        let pagination = flowable.pagination();
        let size = flowable.wrap(avail_width, avail_height);

        // keep-together content that would fit on a fresh page moves there
        // instead of splitting mid-block.
        if matches!(pagination.break_inside, BreakInside::Avoid)
            && size.height > avail_height
            && size.height <= self.rect.height
            && !self.is_empty()
        {
            return AddResult::Overflow(flowable);
        }

        if size.height <= avail_height {
            flowable.draw(
                canvas,
                self.rect.x,
                self.rect.y + self.cursor_y,
                avail_width,
                avail_height,
            );
            self.cursor_y += size.height;
            return AddResult::Placed;
        }

        if let Some((first, second)) = flowable.split(avail_width, avail_height) {
            let first_size = first.wrap(avail_width, avail_height);
            if first_size.height > Pt::ZERO && first_size.height <= avail_height {
                first.draw(
                    canvas,
                    self.rect.x,
                    self.rect.y + self.cursor_y,
                    avail_width,
                    avail_height,
                );
                self.cursor_y += first_size.height;
                return AddResult::Split(second);
            }
        }

        // A flowable taller than a full page that cannot be split is placed
        // on an empty frame rather than failing pagination outright.
        if self.is_empty() {
            flowable.draw(
                canvas,
                self.rect.x,
                self.rect.y + self.cursor_y,
                avail_width,
                avail_height,
            );
            self.cursor_y = self.rect.height;
            return AddResult::Placed;
        }

        AddResult::Overflow(flowable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flowable::{Paragraph, Spacer, TextStyle};
    use crate::types::Size;

    fn frame(width: f32, height: f32) -> Frame {
        Frame::new(Rect {
            x: Pt::ZERO,
            y: Pt::ZERO,
            width: Pt::from_f32(width),
            height: Pt::from_f32(height),
        })
    }

    #[test]
    fn places_content_that_fits() {
        let mut f = frame(200.0, 100.0);
        let mut canvas = Canvas::new(Size::a4());
        match f.add(Box::new(Spacer::new(40.0)), &mut canvas) {
            AddResult::Placed => {}
            _ => panic!("spacer should fit"),
        }
        assert_eq!(f.remaining_height().to_milli_i64(), 60_000);
    }

    #[test]
    fn splits_paragraph_across_frames() {
        let mut f = frame(60.0, 30.0);
        let mut canvas = Canvas::new(Size::a4());
        let style = TextStyle::sized(10.0);
        let para = Paragraph::new("one two three four five six seven eight").with_style(style);
        match f.add(Box::new(para), &mut canvas) {
            AddResult::Split(rest) => {
                let remaining = rest.wrap(Pt::from_f32(60.0), Pt::from_f32(1000.0));
                assert!(remaining.height > Pt::ZERO);
            }
            _ => panic!("expected a split"),
        }
    }

    #[test]
    fn overflows_unsplittable_content_on_partial_frame() {
        let mut f = frame(100.0, 100.0);
        let mut canvas = Canvas::new(Size::a4());
        match f.add(Box::new(Spacer::new(60.0)), &mut canvas) {
            AddResult::Placed => {}
            _ => panic!("first spacer fits"),
        }
        match f.add(Box::new(Spacer::new(60.0)), &mut canvas) {
            AddResult::Overflow(_) => {}
            _ => panic!("second spacer must overflow to the next frame"),
        }
    }
}
