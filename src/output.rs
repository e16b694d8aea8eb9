//! CLI output formatting for every command.
//!
//! # Information-First Display
//!
//! Every image is shown by its semantic identity (positional index and
//! display title) with URLs and paths as indented context lines. Records
//! without a title show their filename in parentheses instead.
//!
//! # Output Format
//!
//! ## Collections
//!
//! ```text
//! 001 Maite Maria Raphasha (124 photos)
//!     Date: September 24, 2023
//!     Slug: maite-maria-raphasha
//!     Cover: https://…/render/image/public/gallery/a.jpg?width=800&quality=80&format=webp
//! ```
//!
//! ## Gallery
//!
//! ```text
//! Maite Maria Raphasha
//!     Unveiling ceremony
//!     September 24, 2023 · 124 photos
//!     Hero: https://…?width=1920&quality=85&format=webp
//!
//! Showing 50 of 124
//! 001 family portrait
//!     Thumb: https://…?width=480&quality=75&format=webp
//! 002 (IMG_0042)
//!     Invalid: image record "b3c1" has neither bucket+path nor a public id
//! … 74 more (scroll to load)
//! ```
//!
//! ## Download
//!
//! ```text
//! Downloading 124 photos
//!     001 dsc_0001.jpg (2.4 MB)
//!     002 dsc_0002.jpg skipped: https://… returned HTTP 404
//! Compressing 123 photos
//! Saved maite-gallery.zip: 123 saved, 1 skipped
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::export::{ExportEvent, ExportOutcome};
use crate::lightbox::Lightbox;
use crate::naming;
use crate::store::{CollectionCard, Gallery};
use crate::types::{CollectionMeta, ImageRecord};
use crate::urls::UrlResolver;
use crate::window::{WindowSnapshot, WindowState};
use chrono::NaiveDate;

// ============================================================================
// Shared entity display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Format an entity header: positional index + title, with optional photo count.
fn entity_header(index: usize, title: &str, count: Option<usize>) -> String {
    match count {
        Some(1) => format!("{} {} (1 photo)", format_index(index), title),
        Some(n) => format!("{} {} ({} photos)", format_index(index), title, n),
        None => format!("{} {}", format_index(index), title),
    }
}

/// Format an image line: titled images show title, untitled show a name in parens.
///
/// ```text
/// 001 The Sunset        // titled
/// 001 (image-1.jpg)     // untitled
/// ```
fn image_line(index: usize, record: &ImageRecord) -> String {
    match naming::display_title(record) {
        Some(title) => format!("{} {}", format_index(index), title),
        None => format!(
            "{} ({})",
            format_index(index),
            naming::archive_entry_name(record, index.saturating_sub(1))
        ),
    }
}

fn photo_count(n: usize) -> String {
    if n == 1 {
        "1 photo".to_string()
    } else {
        format!("{n} photos")
    }
}

/// Human-readable byte size: `512 B`, `14.2 KB`, `2.4 MB`.
fn format_bytes(bytes: usize) -> String {
    const KB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KB {
        format!("{bytes} B")
    } else if b < KB * KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{:.1} MB", b / (KB * KB))
    }
}

/// Collection date as `Month D, YYYY`.
///
/// Accepts a bare ISO date or a timestamp (only the date part is read).
/// Unparseable input is shown verbatim.
pub fn format_event_date(raw: &str) -> String {
    raw.get(..10)
        .and_then(|date| NaiveDate::parse_from_str(date, "%Y-%m-%d").ok())
        .map(|date| date.format("%B %-d, %Y").to_string())
        .unwrap_or_else(|| raw.to_string())
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{}", line);
    }
}

// ============================================================================
// Collections
// ============================================================================

pub fn format_collections(cards: &[CollectionCard], resolver: &UrlResolver) -> Vec<String> {
    if cards.is_empty() {
        return vec!["No collections".to_string()];
    }
    let mut lines = Vec::new();
    for (i, card) in cards.iter().enumerate() {
        lines.push(entity_header(i + 1, &card.meta.title, Some(card.image_count)));
        lines.push(format!("{}Date: {}", indent(1), format_event_date(&card.meta.event_date)));
        lines.push(format!("{}Slug: {}", indent(1), card.meta.slug));
        if let Some(cover) = card.cover.as_ref().and_then(|r| resolver.cover_url(r).ok()) {
            lines.push(format!("{}Cover: {}", indent(1), cover));
        }
    }
    lines
}

pub fn print_collections(cards: &[CollectionCard], resolver: &UrlResolver) {
    print_lines(format_collections(cards, resolver));
}

// ============================================================================
// Gallery
// ============================================================================

fn gallery_header(meta: &CollectionMeta, count: usize, hero: Option<String>) -> Vec<String> {
    let mut lines = vec![meta.title.clone()];
    if let Some(subtitle) = meta.subtitle.as_deref().filter(|s| !s.is_empty()) {
        lines.push(format!("{}{}", indent(1), subtitle));
    }
    lines.push(format!(
        "{}{} \u{00b7} {}",
        indent(1),
        format_event_date(&meta.event_date),
        photo_count(count)
    ));
    if let Some(hero) = hero {
        lines.push(format!("{}Hero: {}", indent(1), hero));
    }
    lines
}

/// Header plus the realized prefix of the grid.
pub fn format_gallery(gallery: &Gallery, resolver: &UrlResolver, window: &WindowSnapshot) -> Vec<String> {
    let (meta, images) = match gallery {
        Gallery::NotFound => return vec!["Gallery not found".to_string()],
        Gallery::Empty(meta) => {
            let mut lines = gallery_header(meta, 0, None);
            lines.push(String::new());
            lines.push("No photos yet".to_string());
            return lines;
        }
        Gallery::Ready { meta, images } => (meta, images),
    };

    let hero = crate::urls::pick_hero(images, meta.hero_image_id.as_deref())
        .and_then(|record| resolver.hero_url(record).ok());
    let mut lines = gallery_header(meta, images.len(), hero);
    lines.push(String::new());
    lines.push(format!("Showing {} of {}", window.visible, window.total));

    for (i, record) in images.iter().take(window.visible).enumerate() {
        lines.push(image_line(i + 1, record));
        match resolver.resolve(record) {
            Ok(urls) => lines.push(format!("{}Thumb: {}", indent(1), urls.thumb)),
            Err(e) => lines.push(format!("{}Invalid: {}", indent(1), e)),
        }
    }
    if window.state == WindowState::Growing {
        lines.push(format!(
            "\u{2026} {} more (scroll to load)",
            window.total.saturating_sub(window.visible)
        ));
    }
    lines
}

pub fn print_gallery(gallery: &Gallery, resolver: &UrlResolver, window: &WindowSnapshot) {
    print_lines(format_gallery(gallery, resolver, window));
}

/// Every URL of every image.
pub fn format_url_sets(records: &[ImageRecord], resolver: &UrlResolver) -> Vec<String> {
    let mut lines = Vec::new();
    for (i, record) in records.iter().enumerate() {
        lines.push(image_line(i + 1, record));
        match resolver.resolve(record) {
            Ok(urls) => {
                lines.push(format!("{}thumb: {}", indent(1), urls.thumb));
                lines.push(format!("{}medium: {}", indent(1), urls.medium));
                lines.push(format!("{}large: {}", indent(1), urls.large));
                lines.push(format!("{}original: {}", indent(1), urls.original));
            }
            Err(e) => lines.push(format!("{}Invalid: {}", indent(1), e)),
        }
    }
    lines
}

pub fn print_url_sets(records: &[ImageRecord], resolver: &UrlResolver) {
    print_lines(format_url_sets(records, resolver));
}

// ============================================================================
// Export
// ============================================================================

/// Format a single export progress event as display lines.
pub fn format_export_event(event: &ExportEvent) -> Vec<String> {
    match event {
        ExportEvent::Started { total } => vec![format!("Downloading {}", photo_count(*total))],
        ExportEvent::ItemSaved { index, name, bytes } => vec![format!(
            "{}{} {} ({})",
            indent(1),
            format_index(index + 1),
            name,
            format_bytes(*bytes)
        )],
        ExportEvent::ItemFailed { index, name, error } => vec![format!(
            "{}{} {} skipped: {}",
            indent(1),
            format_index(index + 1),
            name,
            error
        )],
        ExportEvent::Serializing { entries } => vec![format!("Compressing {}", photo_count(*entries))],
        ExportEvent::Finished(summary) => {
            let name = summary
                .path
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_else(|| summary.path.display().to_string());
            vec![format!("Saved {}: {}", name, summary)]
        }
        ExportEvent::Cancelled => vec!["Download cancelled".to_string()],
    }
}

/// Final line for outcomes that emit no `Finished` event.
pub fn format_export_outcome(outcome: &ExportOutcome) -> Option<String> {
    match outcome {
        ExportOutcome::Completed(_) => None,
        ExportOutcome::AlreadyRunning => Some("A download is already in progress".to_string()),
        ExportOutcome::Cancelled => Some("Nothing was saved".to_string()),
    }
}

// ============================================================================
// Lightbox
// ============================================================================

/// Position, current large URL and neighbour URLs.
///
/// ```text
/// 3 / 24  https://…/c.jpg?width=1280&quality=75&format=webp
///     Previous: https://…/b.jpg?width=1280…
///     Next: https://…/d.jpg?width=1280…
/// ```
pub fn format_lightbox(lightbox: &Lightbox) -> Vec<String> {
    let current = lightbox.current_url().unwrap_or("(unavailable)");
    let mut lines = vec![format!("{}  {}", lightbox.position_label(), current)];
    if lightbox.len() > 1 {
        let prev = crate::lightbox::prev_index(lightbox.index(), lightbox.len());
        let next = crate::lightbox::next_index(lightbox.index(), lightbox.len());
        lines.push(format!(
            "{}Previous: {}",
            indent(1),
            lightbox.url_at(prev).unwrap_or("(unavailable)")
        ));
        lines.push(format!(
            "{}Next: {}",
            indent(1),
            lightbox.url_at(next).unwrap_or("(unavailable)")
        ));
    }
    lines
}

pub fn print_lightbox(lightbox: &Lightbox) {
    print_lines(format_lightbox(lightbox));
}
