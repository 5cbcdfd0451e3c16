use crate::canvas::{Command, Document};
use crate::error::{ReportError, Result};
use crate::types::{Color, Pt};
use base64::Engine;
use image::GenericImageView;
use std::collections::BTreeMap;

const PDF_HEADER: &[u8] = b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n";

#[derive(Debug, Clone, Default)]
pub struct PdfOptions {
    pub document_title: Option<String>,
}

/// In-memory image resources referenced by `DrawImage` commands. Falls back
/// to data-URI decoding and then the filesystem, so branding logos can be
/// supplied as registered bytes, inline data or a path.
#[derive(Debug, Clone, Default)]
pub struct ImageRegistry {
    images: BTreeMap<String, Vec<u8>>,
}

impl ImageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, resource_id: impl Into<String>, bytes: Vec<u8>) {
        self.images.insert(resource_id.into(), bytes);
    }

    pub fn contains(&self, resource_id: &str) -> bool {
        self.images.contains_key(resource_id)
    }

    pub fn resolve(&self, resource_id: &str) -> Result<Vec<u8>> {
        if let Some(bytes) = self.images.get(resource_id) {
            return Ok(bytes.clone());
        }
        if let Some(rest) = resource_id.strip_prefix("data:") {
            let parts: Vec<&str> = rest.splitn(2, ',').collect();
            if parts.len() == 2 && parts[0].contains("base64") {
                return base64::engine::general_purpose::STANDARD
                    .decode(parts[1])
                    .map_err(|_| ReportError::MissingImage(resource_id.to_string()));
            }
            return Err(ReportError::MissingImage(resource_id.to_string()));
        }
        std::fs::read(resource_id).map_err(|_| ReportError::MissingImage(resource_id.to_string()))
    }
}

struct EmbeddedImage {
    resource_name: String,
    object_id: usize,
    width: u32,
    height: u32,
    color_space: &'static str,
    dct: bool,
    data: Vec<u8>,
}

/// Serializes a laid-out `Document` to PDF bytes. Base-14 fonts only;
/// content streams are written uncompressed so output is reproducible
/// byte-for-byte for identical input.
pub fn write_document(
    document: &Document,
    images: &ImageRegistry,
    options: &PdfOptions,
) -> Result<Vec<u8>> {
    let page_count = document.pages.len();

    // Fonts: the canvas elides a SetFontName matching its initial state, so
    // Helvetica is always present.
    let mut font_names: Vec<String> = vec!["Helvetica".to_string()];
    for page in &document.pages {
        for cmd in &page.commands {
            if let Command::SetFontName(name) = cmd {
                if !font_names.iter().any(|n| n == name) {
                    font_names.push(name.clone());
                }
            }
        }
    }

    // Distinct opacity pairs become shared ExtGState entries.
    let mut gstates: BTreeMap<(i32, i32), String> = BTreeMap::new();
    for page in &document.pages {
        for cmd in &page.commands {
            if let Command::SetOpacity { fill, stroke } = cmd {
                let key = (quantize_alpha(*fill), quantize_alpha(*stroke));
                let next = gstates.len() + 1;
                gstates.entry(key).or_insert_with(|| format!("GS{next}"));
            }
        }
    }

    // Object layout: 1 catalog, 2 page root, then fonts, gstates, images,
    // then (page, content) pairs, finally optional info.
    let mut next_id = 3usize;
    let mut font_ids: BTreeMap<String, (String, usize)> = BTreeMap::new();
    for (idx, name) in font_names.iter().enumerate() {
        font_ids.insert(name.clone(), (format!("F{}", idx + 1), next_id));
        next_id += 1;
    }
    let gstate_base = next_id;
    next_id += gstates.len();

    let mut embedded: Vec<EmbeddedImage> = Vec::new();
    let mut image_lookup: BTreeMap<String, usize> = BTreeMap::new();
    for page in &document.pages {
        for cmd in &page.commands {
            if let Command::DrawImage { resource_id, .. } = cmd {
                if image_lookup.contains_key(resource_id) {
                    continue;
                }
                let bytes = images.resolve(resource_id)?;
                let embed = embed_image(resource_id, &bytes, next_id, embedded.len() + 1)?;
                image_lookup.insert(resource_id.clone(), embedded.len());
                embedded.push(embed);
                next_id += 1;
            }
        }
    }

    let first_page_id = next_id;
    let info_id = first_page_id + page_count * 2;

    let mut out: Vec<u8> = Vec::new();
    let mut offsets: Vec<(usize, usize)> = Vec::new();
    out.extend_from_slice(PDF_HEADER);

    let mut push_obj = |out: &mut Vec<u8>, id: usize, body: &[u8]| {
        offsets.push((id, out.len()));
        out.extend_from_slice(format!("{id} 0 obj\n").as_bytes());
        out.extend_from_slice(body);
        out.extend_from_slice(b"\nendobj\n");
    };

    push_obj(&mut out, 1, b"<< /Type /Catalog /Pages 2 0 R >>");

    let kids: Vec<String> = (0..page_count)
        .map(|i| format!("{} 0 R", first_page_id + i * 2))
        .collect();
    push_obj(
        &mut out,
        2,
        format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            kids.join(" "),
            page_count
        )
        .as_bytes(),
    );

    for name in &font_names {
        let (_, id) = &font_ids[name];
        push_obj(
            &mut out,
            *id,
            format!(
                "<< /Type /Font /Subtype /Type1 /BaseFont /{name} /Encoding /WinAnsiEncoding >>"
            )
            .as_bytes(),
        );
    }

    for (idx, ((fill, stroke), _name)) in gstates.iter().enumerate() {
        push_obj(
            &mut out,
            gstate_base + idx,
            format!(
                "<< /Type /ExtGState /ca {} /CA {} >>",
                fmt_alpha(*fill),
                fmt_alpha(*stroke)
            )
            .as_bytes(),
        );
    }

    for embed in &embedded {
        let filter = if embed.dct { " /Filter /DCTDecode" } else { "" };
        let mut body = format!(
            "<< /Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace /{} /BitsPerComponent 8{} /Length {} >>\nstream\n",
            embed.width,
            embed.height,
            embed.color_space,
            filter,
            embed.data.len()
        )
        .into_bytes();
        body.extend_from_slice(&embed.data);
        body.extend_from_slice(b"\nendstream");
        push_obj(&mut out, embed.object_id, &body);
    }

    let font_resources: Vec<String> = font_ids
        .values()
        .map(|(res, id)| format!("/{res} {id} 0 R"))
        .collect();
    let gstate_resources: Vec<String> = gstates
        .values()
        .enumerate()
        .map(|(idx, name)| format!("/{name} {} 0 R", gstate_base + idx))
        .collect();
    let image_resources: Vec<String> = embedded
        .iter()
        .map(|e| format!("/{} {} 0 R", e.resource_name, e.object_id))
        .collect();
    let mut resources = format!("/Font << {} >>", font_resources.join(" "));
    if !gstate_resources.is_empty() {
        resources.push_str(&format!(" /ExtGState << {} >>", gstate_resources.join(" ")));
    }
    if !image_resources.is_empty() {
        resources.push_str(&format!(" /XObject << {} >>", image_resources.join(" ")));
    }

    let media_box = format!(
        "[0 0 {} {}]",
        fmt_pt(document.page_size.width),
        fmt_pt(document.page_size.height)
    );

    for (page_idx, page) in document.pages.iter().enumerate() {
        let page_id = first_page_id + page_idx * 2;
        let content_id = page_id + 1;
        push_obj(
            &mut out,
            page_id,
            format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox {media_box} /Resources << {resources} >> /Contents {content_id} 0 R >>"
            )
            .as_bytes(),
        );

        let stream = content_stream(
            &page.commands,
            document.page_size.height,
            &font_ids,
            &gstates,
            &embedded,
            &image_lookup,
        );
        let mut body =
            format!("<< /Length {} >>\nstream\n", stream.len()).into_bytes();
        body.extend_from_slice(stream.as_bytes());
        body.extend_from_slice(b"\nendstream");
        push_obj(&mut out, content_id, &body);
    }

    let has_info = options.document_title.is_some();
    if let Some(title) = &options.document_title {
        push_obj(
            &mut out,
            info_id,
            format!("<< /Title ({}) >>", escape_pdf_string(title)).as_bytes(),
        );
    }

    // Cross-reference table. Offsets are tracked as objects are emitted, so
    // the table is exact by construction.
    let total_objects = if has_info { info_id } else { info_id - 1 };
    let xref_offset = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", total_objects + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    let mut by_id: BTreeMap<usize, usize> = BTreeMap::new();
    for (id, offset) in &offsets {
        by_id.insert(*id, *offset);
    }
    for id in 1..=total_objects {
        let offset = by_id.get(&id).copied().unwrap_or(0);
        out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    let info_entry = if has_info {
        format!(" /Info {info_id} 0 R")
    } else {
        String::new()
    };
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R{} >>\nstartxref\n{}\n%%EOF\n",
            total_objects + 1,
            info_entry,
            xref_offset
        )
        .as_bytes(),
    );

    Ok(out)
}

fn embed_image(
    resource_id: &str,
    bytes: &[u8],
    object_id: usize,
    index: usize,
) -> Result<EmbeddedImage> {
    let format = image::guess_format(bytes)
        .map_err(|_| ReportError::MissingImage(resource_id.to_string()))?;
    let decoded = image::load_from_memory(bytes)
        .map_err(|_| ReportError::MissingImage(resource_id.to_string()))?;
    let (width, height) = decoded.dimensions();

    if format == image::ImageFormat::Jpeg {
        // JPEG passes through untouched as a DCT stream.
        let color_space = match decoded.color() {
            image::ColorType::L8 | image::ColorType::L16 => "DeviceGray",
            _ => "DeviceRGB",
        };
        return Ok(EmbeddedImage {
            resource_name: format!("Im{index}"),
            object_id,
            width,
            height,
            color_space,
            dct: true,
            data: bytes.to_vec(),
        });
    }

    // Everything else is decoded to raw RGB rows.
    let rgb = decoded.to_rgb8();
    Ok(EmbeddedImage {
        resource_name: format!("Im{index}"),
        object_id,
        width,
        height,
        color_space: "DeviceRGB",
        dct: false,
        data: rgb.into_raw(),
    })
}

fn content_stream(
    commands: &[Command],
    page_height: Pt,
    font_ids: &BTreeMap<String, (String, usize)>,
    gstates: &BTreeMap<(i32, i32), String>,
    embedded: &[EmbeddedImage],
    image_lookup: &BTreeMap<String, usize>,
) -> String {
    let h = page_height;
    let mut s = String::new();
    let mut font_name = "Helvetica".to_string();
    let mut font_size = Pt::from_f32(12.0);
    let mut font_stack: Vec<(String, Pt)> = Vec::new();

    for cmd in commands {
        match cmd {
            Command::SaveState => {
                font_stack.push((font_name.clone(), font_size));
                s.push_str("q\n");
            }
            Command::RestoreState => {
                if let Some((name, size)) = font_stack.pop() {
                    font_name = name;
                    font_size = size;
                }
                s.push_str("Q\n");
            }
            Command::SetFillColor(color) => {
                s.push_str(&format!("{} rg\n", fmt_color(*color)));
            }
            Command::SetStrokeColor(color) => {
                s.push_str(&format!("{} RG\n", fmt_color(*color)));
            }
            Command::SetLineWidth(width) => {
                s.push_str(&format!("{} w\n", fmt_pt(*width)));
            }
            Command::SetOpacity { fill, stroke } => {
                let key = (quantize_alpha(*fill), quantize_alpha(*stroke));
                if let Some(name) = gstates.get(&key) {
                    s.push_str(&format!("/{name} gs\n"));
                }
            }
            Command::SetFontName(name) => {
                font_name = name.clone();
            }
            Command::SetFontSize(size) => {
                font_size = *size;
            }
            Command::MoveTo { x, y } => {
                s.push_str(&format!("{} {} m\n", fmt_pt(*x), fmt_pt(h - *y)));
            }
            Command::LineTo { x, y } => {
                s.push_str(&format!("{} {} l\n", fmt_pt(*x), fmt_pt(h - *y)));
            }
            Command::ClosePath => s.push_str("h\n"),
            Command::Fill => s.push_str("f\n"),
            Command::Stroke => s.push_str("S\n"),
            Command::DrawString { x, y, text } => {
                let resource = font_ids
                    .get(&font_name)
                    .map(|(res, _)| res.as_str())
                    .unwrap_or("F1");
                // y is the top of the text box; the baseline sits one em down.
                let baseline = h - *y - font_size;
                s.push_str(&format!(
                    "BT /{resource} {} Tf {} {} Td ({}) Tj ET\n",
                    fmt_pt(font_size),
                    fmt_pt(*x),
                    fmt_pt(baseline),
                    encode_winansi(text)
                ));
            }
            Command::DrawRect {
                x,
                y,
                width,
                height,
            } => {
                s.push_str(&format!(
                    "{} {} {} {} re\n",
                    fmt_pt(*x),
                    fmt_pt(h - *y - *height),
                    fmt_pt(*width),
                    fmt_pt(*height)
                ));
            }
            Command::DrawImage {
                x,
                y,
                width,
                height,
                resource_id,
            } => {
                if let Some(idx) = image_lookup.get(resource_id) {
                    let name = &embedded[*idx].resource_name;
                    s.push_str(&format!(
                        "q {} 0 0 {} {} {} cm /{name} Do Q\n",
                        fmt_pt(*width),
                        fmt_pt(*height),
                        fmt_pt(*x),
                        fmt_pt(h - *y - *height)
                    ));
                }
            }
        }
    }
    s
}

fn fmt_pt(value: Pt) -> String {
    let milli = value.to_milli_i64();
    let sign = if milli < 0 { "-" } else { "" };
    let abs = milli.abs();
    format!("{sign}{}.{:03}", abs / 1000, abs % 1000)
}

fn fmt_color(color: Color) -> String {
    format!(
        "{:.3} {:.3} {:.3}",
        color.r.clamp(0.0, 1.0),
        color.g.clamp(0.0, 1.0),
        color.b.clamp(0.0, 1.0)
    )
}

fn quantize_alpha(alpha: f32) -> i32 {
    (alpha.clamp(0.0, 1.0) * 1000.0).round() as i32
}

fn fmt_alpha(quantized: i32) -> String {
    format!("{}.{:03}", quantized / 1000, quantized % 1000)
}

fn escape_pdf_string(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '(' => "\\(".to_string(),
            ')' => "\\)".to_string(),
            '\\' => "\\\\".to_string(),
            c if (c as u32) < 0x80 => c.to_string(),
            _ => "?".to_string(),
        })
        .collect()
}

/// Encodes text for a WinAnsi content stream. Latin-1 passes through;
/// common typographic characters map to their WinAnsi slots; anything
/// else degrades to `?` rather than corrupting the stream.
fn encode_winansi(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '(' => out.push_str("\\("),
            ')' => out.push_str("\\)"),
            '\\' => out.push_str("\\\\"),
            '\n' | '\r' => out.push(' '),
            '\u{2013}' => out.push_str("\\226"), // en dash
            '\u{2014}' => out.push_str("\\227"), // em dash
            '\u{2018}' => out.push_str("\\221"),
            '\u{2019}' => out.push_str("\\222"),
            '\u{201C}' => out.push_str("\\223"),
            '\u{201D}' => out.push_str("\\224"),
            '\u{2022}' => out.push_str("\\225"), // bullet
            '\u{2026}' => out.push_str("\\205"), // ellipsis
            '\u{20AC}' => out.push_str("\\200"), // euro
            c if (c as u32) >= 0x20 && (c as u32) <= 0x7E => out.push(c),
            c if (c as u32) >= 0xA0 && (c as u32) <= 0xFF => {
                out.push_str(&format!("\\{:03o}", c as u32));
            }
            _ => out.push('?'),
        }
    }
    out
}
