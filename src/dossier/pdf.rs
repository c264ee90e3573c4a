// src/dossier/pdf.rs
use anyhow::{anyhow, Result};
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference};
use tracing::debug;

use super::{text::TIMESTAMP_FORMAT, Dossier, EntryKind};

const PAGE_W: f32 = 210.0;
const PAGE_H: f32 = 297.0;
const MARGIN: f32 = 15.0;
const TITLE_SIZE: f32 = 14.0;
const SUBTITLE_SIZE: f32 = 9.0;
const HEADING_SIZE: f32 = 11.0;
const BODY_SIZE: f32 = 9.0;
const LINE_H: f32 = 5.0;
const HEADING_H: f32 = 8.0;
/// Characters per body line at `BODY_SIZE` in Helvetica across the printable width.
const WRAP_COLS: usize = 100;
const INDENT: f32 = 4.0;

/// Make `text` safe for a single-byte (Latin-1) font encoding. A few common
/// symbols get ASCII stand-ins, everything else outside printable Latin-1
/// becomes `?`.
pub fn latin1_safe(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '—' | '–' | '‒' | '−' => out.push('-'),
            '★' | '⭐' | '☆' => out.push('*'),
            '‘' | '’' | '‚' | '′' => out.push('\''),
            '“' | '”' | '„' | '″' => out.push('"'),
            '…' => out.push_str("..."),
            '\t' => out.push(' '),
            c if (' '..='~').contains(&c) || ('\u{a0}'..='\u{ff}').contains(&c) => out.push(c),
            // variation selectors and zero-width joiners trail emoji
            '\u{fe00}'..='\u{fe0f}' | '\u{200b}'..='\u{200d}' => {}
            _ => out.push('?'),
        }
    }
    out
}

/// Greedy word wrap on character count; words longer than `width` are split.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let rest = word.split_off(width);
            lines.push(word.into_iter().collect());
            word = rest;
        }
        let cur_len = current.chars().count();
        if cur_len > 0 && cur_len + 1 + word.len() > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.extend(word);
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

struct Pages {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    y: f32,
    page_no: usize,
    title: String,
    subtitle: String,
}

impl Pages {
    fn new(dossier: &Dossier) -> Result<Self> {
        let title = latin1_safe(&format!("{} | DOSSIER EXPORT", dossier.title));
        let (doc, page, layer) = PdfDocument::new(title.as_str(), Mm(PAGE_W), Mm(PAGE_H), "content");
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| anyhow!("loading Helvetica: {:?}", e))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| anyhow!("loading Helvetica-Bold: {:?}", e))?;
        let layer = doc.get_page(page).get_layer(layer);
        let subtitle = latin1_safe(&format!(
            "Profile: {}   Generated: {}",
            dossier.profile,
            dossier.generated_at.format(TIMESTAMP_FORMAT)
        ));
        let mut pages = Self {
            doc,
            layer,
            regular,
            bold,
            y: PAGE_H - MARGIN,
            page_no: 1,
            title,
            subtitle,
        };
        pages.header();
        Ok(pages)
    }

    /// Title on the first tier, profile/timestamp/page on the second.
    fn header(&mut self) {
        self.y = PAGE_H - MARGIN;
        self.layer
            .use_text(self.title.clone(), TITLE_SIZE, Mm(MARGIN), Mm(self.y), &self.bold);
        self.y -= 6.0;
        let sub = format!("{}   Page {}", self.subtitle, self.page_no);
        self.layer
            .use_text(sub, SUBTITLE_SIZE, Mm(MARGIN), Mm(self.y), &self.regular);
        self.y -= 10.0;
    }

    fn ensure(&mut self, height: f32) {
        if self.y - height < MARGIN {
            let (page, layer) = self.doc.add_page(Mm(PAGE_W), Mm(PAGE_H), "content");
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.page_no += 1;
            self.header();
        }
    }

    fn heading(&mut self, text: &str) {
        self.ensure(HEADING_H + LINE_H);
        self.y -= 2.0;
        self.layer.use_text(
            latin1_safe(text),
            HEADING_SIZE,
            Mm(MARGIN),
            Mm(self.y),
            &self.bold,
        );
        self.y -= HEADING_H - 2.0;
    }

    fn body(&mut self, text: &str, indent: f32) {
        self.ensure(LINE_H);
        self.layer.use_text(
            text.to_string(),
            BODY_SIZE,
            Mm(MARGIN + indent),
            Mm(self.y),
            &self.regular,
        );
        self.y -= LINE_H;
    }

    fn finish(self) -> Result<Vec<u8>> {
        debug!(pages = self.page_no, "rendered dossier pdf");
        self.doc
            .save_to_bytes()
            .map_err(|e| anyhow!("writing pdf: {:?}", e))
    }
}

/// Paginated A4 report using the built-in Helvetica fonts.
pub fn render(dossier: &Dossier) -> Result<Vec<u8>> {
    let mut pages = Pages::new(dossier)?;

    for section in &dossier.sections {
        let heading = if section.highlighted {
            format!("{} *", section.group.to_uppercase())
        } else {
            section.group.to_uppercase()
        };
        pages.heading(&heading);

        for entry in &section.entries {
            let line = latin1_safe(&format!("{}: {}", entry.field, entry.value));
            match entry.kind {
                EntryKind::LongText => {
                    pages.body(&latin1_safe(&format!("{}:", entry.field)), 0.0);
                    for chunk in wrap(&latin1_safe(&entry.value), WRAP_COLS - 4) {
                        pages.body(&chunk, INDENT);
                    }
                }
                _ => {
                    let mut chunks = wrap(&line, WRAP_COLS).into_iter();
                    if let Some(first) = chunks.next() {
                        pages.body(&first, 0.0);
                    }
                    for chunk in chunks {
                        pages.body(&chunk, INDENT);
                    }
                }
            }
        }
        pages.y -= 2.0;
    }

    pages.finish()
}
