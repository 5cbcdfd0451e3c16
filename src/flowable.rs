use crate::canvas::Canvas;
use crate::types::{Color, Pt, Size};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BreakBefore {
    #[default]
    Auto,
    Page,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BreakAfter {
    #[default]
    Auto,
    Page,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BreakInside {
    #[default]
    Auto,
    Avoid,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Pagination {
    pub break_before: BreakBefore,
    pub break_after: BreakAfter,
    pub break_inside: BreakInside,
}

impl Pagination {
    pub fn keep_together() -> Self {
        Self {
            break_inside: BreakInside::Avoid,
            ..Self::default()
        }
    }

    pub fn page_before() -> Self {
        Self {
            break_before: BreakBefore::Page,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone)]
pub struct TextStyle {
    pub font_size: Pt,
    pub line_height: Pt,
    pub line_height_is_auto: bool,
    pub color: Color,
    pub font_name: String,
}

impl Default for TextStyle {
    fn default() -> Self {
        let font_size = Pt::from_f32(12.0);
        Self {
            font_size,
            line_height: font_size.mul_ratio(6, 5),
            line_height_is_auto: true,
            color: Color::BLACK,
            font_name: "Helvetica".to_string(),
        }
    }
}

impl TextStyle {
    pub fn sized(size: f32) -> Self {
        let font_size = Pt::from_f32(size);
        Self {
            font_size,
            line_height: font_size.mul_ratio(6, 5),
            ..Self::default()
        }
    }

    pub fn bold(size: f32) -> Self {
        Self {
            font_name: "Helvetica-Bold".to_string(),
            ..Self::sized(size)
        }
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    pub fn effective_line_height(&self) -> Pt {
        if self.line_height_is_auto {
            self.font_size.mul_ratio(6, 5)
        } else {
            self.line_height
        }
    }

    /// Approximate advance for base-14 text: 0.6 em per character. Good
    /// enough for greedy wrapping; overflow is handled structurally by
    /// pagination, never by clipping.
    pub fn measure(&self, text: &str) -> Pt {
        let char_width = (self.font_size * 0.6).max(Pt::from_f32(1.0));
        char_width * (text.chars().count() as i32)
    }

    pub fn chars_per_line(&self, avail_width: Pt) -> usize {
        let char_width = (self.font_size * 0.6).max(Pt::from_f32(1.0));
        let fit = avail_width.to_milli_i64() / char_width.to_milli_i64().max(1);
        fit.max(1) as usize
    }
}

pub trait Flowable: Send + Sync {
    fn wrap(&self, avail_width: Pt, avail_height: Pt) -> Size;
    fn split(
        &self,
        avail_width: Pt,
        avail_height: Pt,
    ) -> Option<(Box<dyn Flowable>, Box<dyn Flowable>)>;
    fn draw(&self, canvas: &mut Canvas, x: Pt, y: Pt, avail_width: Pt, avail_height: Pt);

    fn pagination(&self) -> Pagination {
        Pagination::default()
    }

    fn debug_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

#[derive(Debug, Clone)]
pub struct Paragraph {
    text: String,
    style: TextStyle,
    align: TextAlign,
    pagination: Pagination,
}

impl Paragraph {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style: TextStyle::default(),
            align: TextAlign::Left,
            pagination: Pagination::default(),
        }
    }

    pub fn with_style(mut self, style: TextStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_align(mut self, align: TextAlign) -> Self {
        self.align = align;
        self
    }

    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = pagination;
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn style(&self) -> &TextStyle {
        &self.style
    }

    /// Greedy word wrap against the available width. Explicit newlines are
    /// respected; a word longer than a full line is hard-broken at character
    /// granularity so no content is ever dropped.
    pub fn layout_lines(&self, avail_width: Pt) -> Vec<String> {
        let max_width = avail_width.max(Pt::from_f32(1.0));
        let mut lines = Vec::new();
        for segment in self.text.split('\n') {
            if segment.trim().is_empty() {
                lines.push(String::new());
                continue;
            }
            let mut current = String::new();
            for word in segment.split_whitespace() {
                let candidate = if current.is_empty() {
                    word.to_string()
                } else {
                    format!("{current} {word}")
                };
                if self.style.measure(&candidate) <= max_width {
                    current = candidate;
                    continue;
                }
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                if self.style.measure(word) <= max_width {
                    current = word.to_string();
                } else {
                    // Hard-break an overlong word.
                    let per_line = self.style.chars_per_line(max_width);
                    let chars: Vec<char> = word.chars().collect();
                    for chunk in chars.chunks(per_line) {
                        lines.push(chunk.iter().collect());
                    }
                    if let Some(last) = lines.pop() {
                        current = last;
                    }
                }
            }
            lines.push(current);
        }
        lines
    }

    fn from_lines(&self, lines: &[String]) -> Paragraph {
        Paragraph {
            text: lines.join("\n"),
            style: self.style.clone(),
            align: self.align,
            pagination: self.pagination,
        }
    }
}

impl Flowable for Paragraph {
    fn wrap(&self, avail_width: Pt, _avail_height: Pt) -> Size {
        let lines = self.layout_lines(avail_width);
        Size {
            width: avail_width,
            height: self.style.effective_line_height() * (lines.len() as i32),
        }
    }

    fn split(
        &self,
        avail_width: Pt,
        avail_height: Pt,
    ) -> Option<(Box<dyn Flowable>, Box<dyn Flowable>)> {
        let line_height = self.style.effective_line_height();
        if line_height <= Pt::ZERO {
            return None;
        }
        let fit = (avail_height.to_milli_i64() / line_height.to_milli_i64().max(1)) as usize;
        if fit == 0 {
            return None;
        }
        let lines = self.layout_lines(avail_width);
        if lines.len() <= fit {
            return None;
        }
        // Already-wrapped lines re-measure as single lines, so rejoining
        // with newlines preserves the layout on both sides of the break.
        let first = self.from_lines(&lines[..fit]);
        let second = self.from_lines(&lines[fit..]);
        Some((Box::new(first), Box::new(second)))
    }

    fn draw(&self, canvas: &mut Canvas, x: Pt, y: Pt, avail_width: Pt, _avail_height: Pt) {
        let lines = self.layout_lines(avail_width);
        let line_height = self.style.effective_line_height();
        canvas.set_font_name(&self.style.font_name);
        canvas.set_font_size(self.style.font_size);
        canvas.set_fill_color(self.style.color);
        for (idx, line) in lines.iter().enumerate() {
            if line.is_empty() {
                continue;
            }
            let width = self.style.measure(line);
            let line_x = match self.align {
                TextAlign::Left => x,
                TextAlign::Center => x + ((avail_width - width).max(Pt::ZERO) / 2),
                TextAlign::Right => x + (avail_width - width).max(Pt::ZERO),
            };
            canvas.draw_string(line_x, y + line_height * (idx as i32), line.clone());
        }
    }

    fn pagination(&self) -> Pagination {
        self.pagination
    }

    fn debug_name(&self) -> &'static str {
        "Paragraph"
    }
}

#[derive(Debug, Clone)]
pub struct Spacer {
    height: Pt,
    pagination: Pagination,
}

impl Spacer {
    pub fn new(height: f32) -> Self {
        Self {
            height: Pt::from_f32(height),
            pagination: Pagination::default(),
        }
    }
}

impl Flowable for Spacer {
    fn wrap(&self, avail_width: Pt, _avail_height: Pt) -> Size {
        Size {
            width: avail_width,
            height: self.height.max(Pt::ZERO),
        }
    }

    fn split(
        &self,
        _avail_width: Pt,
        _avail_height: Pt,
    ) -> Option<(Box<dyn Flowable>, Box<dyn Flowable>)> {
        None
    }

    fn draw(&self, _canvas: &mut Canvas, _x: Pt, _y: Pt, _avail_width: Pt, _avail_height: Pt) {}

    fn pagination(&self) -> Pagination {
        self.pagination
    }

    fn debug_name(&self) -> &'static str {
        "Spacer"
    }
}

#[derive(Debug, Clone)]
pub struct ImageFlowable {
    pub width: Pt,
    pub height: Pt,
    pub resource_id: String,
    align: TextAlign,
    pagination: Pagination,
}

impl ImageFlowable {
    pub fn new(width: f32, height: f32, resource_id: impl Into<String>) -> Self {
        Self {
            width: Pt::from_f32(width),
            height: Pt::from_f32(height),
            resource_id: resource_id.into(),
            align: TextAlign::Left,
            pagination: Pagination::default(),
        }
    }

    pub fn with_align(mut self, align: TextAlign) -> Self {
        self.align = align;
        self
    }

    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = pagination;
        self
    }
}

impl Flowable for ImageFlowable {
    fn wrap(&self, _avail_width: Pt, _avail_height: Pt) -> Size {
        Size {
            width: self.width,
            height: self.height,
        }
    }

    fn split(
        &self,
        _avail_width: Pt,
        _avail_height: Pt,
    ) -> Option<(Box<dyn Flowable>, Box<dyn Flowable>)> {
        None
    }

    fn draw(&self, canvas: &mut Canvas, x: Pt, y: Pt, avail_width: Pt, _avail_height: Pt) {
        let x = match self.align {
            TextAlign::Left => x,
            TextAlign::Center => x + ((avail_width - self.width).max(Pt::ZERO) / 2),
            TextAlign::Right => x + (avail_width - self.width).max(Pt::ZERO),
        };
        canvas.draw_image(x, y, self.width, self.height, self.resource_id.clone());
    }

    fn pagination(&self) -> Pagination {
        self.pagination
    }

    fn debug_name(&self) -> &'static str {
        "ImageFlowable"
    }
}

#[derive(Debug, Clone)]
pub struct TableColumn {
    pub header: String,
    pub width_ratio: f32,
}

impl TableColumn {
    pub fn new(header: impl Into<String>, width_ratio: f32) -> Self {
        Self {
            header: header.into(),
            width_ratio: width_ratio.max(0.01),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TableStyle {
    pub header_style: TextStyle,
    pub body_style: TextStyle,
    pub header_fill: Color,
    pub grid_color: Color,
    pub grid_width: Pt,
    pub cell_padding: Pt,
}

impl Default for TableStyle {
    fn default() -> Self {
        Self {
            header_style: TextStyle::bold(10.0).with_color(Color::WHITE),
            body_style: TextStyle::sized(10.0),
            header_fill: Color::rgb(0.15, 0.2, 0.3),
            grid_color: Color::rgb(0.7, 0.7, 0.7),
            grid_width: Pt::from_f32(0.5),
            cell_padding: Pt::from_f32(4.0),
        }
    }
}

/// Fixed-column table. Rows wrap their cell text, split at row boundaries
/// when they overflow a frame, and repeat the header on continuations.
#[derive(Debug, Clone)]
pub struct TableFlowable {
    columns: Vec<TableColumn>,
    rows: Vec<Vec<String>>,
    style: TableStyle,
    repeat_header: bool,
    show_header: bool,
    pagination: Pagination,
}

impl TableFlowable {
    pub fn new(columns: Vec<TableColumn>, rows: Vec<Vec<String>>) -> Self {
        Self {
            columns,
            rows,
            style: TableStyle::default(),
            repeat_header: true,
            show_header: true,
            pagination: Pagination::default(),
        }
    }

    pub fn with_style(mut self, style: TableStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = pagination;
        self
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn column_widths(&self, avail_width: Pt) -> Vec<Pt> {
        let total: f32 = self.columns.iter().map(|c| c.width_ratio).sum();
        self.columns
            .iter()
            .map(|c| avail_width * (c.width_ratio / total))
            .collect()
    }

    fn cell_lines(&self, text: &str, style: &TextStyle, col_width: Pt) -> Vec<String> {
        let inner = (col_width - self.style.cell_padding * 2).max(Pt::from_f32(1.0));
        Paragraph::new(text)
            .with_style(style.clone())
            .layout_lines(inner)
    }

    fn row_height(&self, cells: &[String], style: &TextStyle, widths: &[Pt]) -> Pt {
        let mut max_lines = 1usize;
        for (idx, cell) in cells.iter().enumerate() {
            let col_width = widths.get(idx).copied().unwrap_or(Pt::from_f32(1.0));
            max_lines = max_lines.max(self.cell_lines(cell, style, col_width).len());
        }
        style.effective_line_height() * (max_lines as i32) + self.style.cell_padding * 2
    }

    fn header_height(&self, widths: &[Pt]) -> Pt {
        if !self.show_header {
            return Pt::ZERO;
        }
        let headers: Vec<String> = self.columns.iter().map(|c| c.header.clone()).collect();
        self.row_height(&headers, &self.style.header_style, widths)
    }

    fn draw_row(
        &self,
        canvas: &mut Canvas,
        cells: &[String],
        style: &TextStyle,
        widths: &[Pt],
        x: Pt,
        y: Pt,
    ) {
        canvas.set_font_name(&style.font_name);
        canvas.set_font_size(style.font_size);
        canvas.set_fill_color(style.color);
        let mut cell_x = x;
        for (idx, width) in widths.iter().enumerate() {
            if let Some(cell) = cells.get(idx) {
                let lines = self.cell_lines(cell, style, *width);
                for (line_idx, line) in lines.iter().enumerate() {
                    if line.is_empty() {
                        continue;
                    }
                    canvas.draw_string(
                        cell_x + self.style.cell_padding,
                        y + self.style.cell_padding
                            + style.effective_line_height() * (line_idx as i32),
                        line.clone(),
                    );
                }
            }
            cell_x += *width;
        }
    }

    fn draw_grid(&self, canvas: &mut Canvas, x: Pt, y: Pt, widths: &[Pt], row_edges: &[Pt]) {
        let table_width: Pt = widths.iter().copied().sum();
        canvas.set_stroke_color(self.style.grid_color);
        canvas.set_line_width(self.style.grid_width);
        for edge in row_edges {
            canvas.move_to(x, y + *edge);
            canvas.line_to(x + table_width, y + *edge);
            canvas.stroke();
        }
        let top = row_edges.first().copied().unwrap_or(Pt::ZERO);
        let bottom = row_edges.last().copied().unwrap_or(Pt::ZERO);
        let mut col_x = x;
        canvas.move_to(col_x, y + top);
        canvas.line_to(col_x, y + bottom);
        canvas.stroke();
        for width in widths {
            col_x += *width;
            canvas.move_to(col_x, y + top);
            canvas.line_to(col_x, y + bottom);
            canvas.stroke();
        }
    }

    fn continuation(&self, rows: Vec<Vec<String>>, show_header: bool) -> TableFlowable {
        TableFlowable {
            columns: self.columns.clone(),
            rows,
            style: self.style.clone(),
            repeat_header: self.repeat_header,
            show_header,
            pagination: self.pagination,
        }
    }
}

impl Flowable for TableFlowable {
    fn wrap(&self, avail_width: Pt, _avail_height: Pt) -> Size {
        let widths = self.column_widths(avail_width);
        let mut height = self.header_height(&widths);
        for row in &self.rows {
            height += self.row_height(row, &self.style.body_style, &widths);
        }
        Size {
            width: avail_width,
            height,
        }
    }

    fn split(
        &self,
        avail_width: Pt,
        avail_height: Pt,
    ) -> Option<(Box<dyn Flowable>, Box<dyn Flowable>)> {
        let widths = self.column_widths(avail_width);
        let header_height = self.header_height(&widths);
        let mut used = header_height;
        let mut fit = 0usize;
        for row in &self.rows {
            let row_height = self.row_height(row, &self.style.body_style, &widths);
            if used + row_height > avail_height {
                break;
            }
            used += row_height;
            fit += 1;
        }
        if fit == 0 || fit >= self.rows.len() {
            return None;
        }
        let first = self.continuation(self.rows[..fit].to_vec(), self.show_header);
        let second = self.continuation(self.rows[fit..].to_vec(), self.repeat_header);
        Some((Box::new(first), Box::new(second)))
    }

    fn draw(&self, canvas: &mut Canvas, x: Pt, y: Pt, avail_width: Pt, _avail_height: Pt) {
        let widths = self.column_widths(avail_width);
        let table_width: Pt = widths.iter().copied().sum();
        let mut cursor = Pt::ZERO;
        let mut row_edges = vec![Pt::ZERO];

        if self.show_header {
            let header_height = self.header_height(&widths);
            canvas.set_fill_color(self.style.header_fill);
            canvas.draw_rect(x, y, table_width, header_height);
            canvas.fill();
            let headers: Vec<String> = self.columns.iter().map(|c| c.header.clone()).collect();
            self.draw_row(canvas, &headers, &self.style.header_style, &widths, x, y);
            cursor += header_height;
            row_edges.push(cursor);
        }

        for row in &self.rows {
            let row_height = self.row_height(row, &self.style.body_style, &widths);
            self.draw_row(canvas, row, &self.style.body_style, &widths, x, y + cursor);
            cursor += row_height;
            row_edges.push(cursor);
        }

        self.draw_grid(canvas, x, y, &widths, &row_edges);
    }

    fn pagination(&self) -> Pagination {
        self.pagination
    }

    fn debug_name(&self) -> &'static str {
        "TableFlowable"
    }
}
