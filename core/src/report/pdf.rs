use printpdf::{BuiltinFont, Color, IndirectFontRef, Mm, PdfDocument, Rgb};

use super::document::{Block, BlockStyle, ReportDocument};
use crate::error::ReportError;
use crate::review::Severity;

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 15.0;
/// 页脚占用的底部区域
const CONTENT_BOTTOM: f32 = 25.0;
const FOOTER_Y: f32 = 12.0;
const PT_TO_MM: f32 = 0.3528;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FontKind {
    Regular,
    Bold,
    Italic,
    Mono,
}

#[derive(Debug, Clone, PartialEq)]
struct PlacedLine {
    text: String,
    font: FontKind,
    size: f32,
    y: f32,
    color: (f32, f32, f32),
}

const TEXT: (f32, f32, f32) = (0.13, 0.15, 0.16);
const MUTED: (f32, f32, f32) = (0.42, 0.46, 0.49);

fn severity_color(severity: Severity) -> (f32, f32, f32) {
    match severity {
        Severity::Critical => (0.53, 0.05, 0.31),
        Severity::High => (0.86, 0.21, 0.27),
        Severity::Medium => (0.85, 0.50, 0.0),
        Severity::Low => (0.70, 0.55, 0.0),
        Severity::Info => (0.09, 0.64, 0.72),
    }
}

fn style_of(style: BlockStyle) -> (FontKind, f32, (f32, f32, f32)) {
    match style {
        BlockStyle::Title => (FontKind::Bold, 20.0, TEXT),
        BlockStyle::Heading => (FontKind::Bold, 14.0, TEXT),
        BlockStyle::Label => (FontKind::Bold, 9.0, TEXT),
        BlockStyle::Body => (FontKind::Regular, 9.0, TEXT),
        BlockStyle::Muted => (FontKind::Italic, 9.0, MUTED),
        BlockStyle::Code => (FontKind::Mono, 8.0, TEXT),
        BlockStyle::Badge(severity) => (FontKind::Bold, 10.0, severity_color(severity)),
        BlockStyle::Spacer => (FontKind::Regular, 6.0, TEXT),
    }
}

/// 内置字体只支持有限字符集，替换为可打印 ASCII
pub fn sanitize_text(text: &str) -> String {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut out = String::with_capacity(normalized.len());
    for ch in normalized.chars() {
        match ch {
            '\n' => out.push('\n'),
            '\t' => out.push_str("    "),
            ' '..='~' => out.push(ch),
            c if c.is_control() => {}
            _ => out.push('?'),
        }
    }
    out
}

/// 按字符数贪心折行，超长单词强制切断
pub fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();

    for paragraph in text.split('\n') {
        let mut current = String::new();
        for word in paragraph.split(' ') {
            let mut word = word.to_string();
            loop {
                let needed = if current.is_empty() {
                    word.len()
                } else {
                    current.len() + 1 + word.len()
                };
                if needed <= max_chars {
                    if !current.is_empty() {
                        current.push(' ');
                    }
                    current.push_str(&word);
                    break;
                }
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                    continue;
                }
                // 文本已清洗为 ASCII，可按字节切分
                let rest = word.split_off(max_chars);
                lines.push(word);
                word = rest;
            }
        }
        lines.push(current);
    }
    lines
}

fn max_chars_for(font: FontKind, size: f32) -> usize {
    // Helvetica 平均字宽约 0.5em，Courier 固定 0.6em
    let em = match font {
        FontKind::Mono => 0.6,
        _ => 0.5,
    };
    let width = PAGE_WIDTH - 2.0 * MARGIN;
    (width / (size * PT_TO_MM * em)).floor() as usize
}

/// 计算每页的文本行位置
fn layout(blocks: &[Block]) -> Vec<Vec<PlacedLine>> {
    let mut pages = vec![Vec::new()];
    let mut y = PAGE_HEIGHT - MARGIN;

    for block in blocks {
        let (font, size, color) = style_of(block.style);
        let line_height = size * PT_TO_MM * 1.4;

        if block.style == BlockStyle::Spacer {
            y -= line_height;
            continue;
        }

        let text = sanitize_text(&block.text);
        for line in wrap_text(&text, max_chars_for(font, size)) {
            if y - line_height < CONTENT_BOTTOM {
                pages.push(Vec::new());
                y = PAGE_HEIGHT - MARGIN;
            }
            y -= line_height;
            if let Some(page) = pages.last_mut() {
                page.push(PlacedLine {
                    text: line,
                    font,
                    size,
                    y,
                    color,
                });
            }
        }
    }
    pages
}

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    italic: IndirectFontRef,
    mono: IndirectFontRef,
}

impl Fonts {
    fn get(&self, kind: FontKind) -> &IndirectFontRef {
        match kind {
            FontKind::Regular => &self.regular,
            FontKind::Bold => &self.bold,
            FontKind::Italic => &self.italic,
            FontKind::Mono => &self.mono,
        }
    }
}

fn pdf_error(err: impl std::fmt::Display) -> ReportError {
    ReportError::Pdf(err.to_string())
}

fn rgb((r, g, b): (f32, f32, f32)) -> Color {
    Color::Rgb(Rgb::new(r, g, b, None))
}

/// 渲染为 PDF 字节
pub fn render_pdf(report: &ReportDocument) -> Result<Vec<u8>, ReportError> {
    let pages = layout(&report.blocks());
    let footer = sanitize_text(&report.footer);

    let (doc, first_page, first_layer) = PdfDocument::new(
        report.heading.as_str(),
        Mm(PAGE_WIDTH),
        Mm(PAGE_HEIGHT),
        "Layer 1",
    );

    let fonts = Fonts {
        regular: doc.add_builtin_font(BuiltinFont::Helvetica).map_err(pdf_error)?,
        bold: doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(pdf_error)?,
        italic: doc
            .add_builtin_font(BuiltinFont::HelveticaOblique)
            .map_err(pdf_error)?,
        mono: doc.add_builtin_font(BuiltinFont::Courier).map_err(pdf_error)?,
    };

    let page_count = pages.len();
    for (index, lines) in pages.into_iter().enumerate() {
        let (page, layer) = if index == 0 {
            (first_page, first_layer)
        } else {
            doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1")
        };
        let layer = doc.get_page(page).get_layer(layer);

        for line in lines {
            layer.set_fill_color(rgb(line.color));
            layer.use_text(
                line.text,
                line.size,
                Mm(MARGIN),
                Mm(line.y),
                fonts.get(line.font),
            );
        }

        layer.set_fill_color(rgb(MUTED));
        layer.use_text(
            format!("{}  -  Page {} of {}", footer, index + 1, page_count),
            8.0,
            Mm(MARGIN),
            Mm(FOOTER_Y),
            fonts.get(FontKind::Italic),
        );
    }

    doc.save_to_bytes().map_err(pdf_error)
}
