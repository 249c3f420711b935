//! Post assembly
//!
//! Renders the Markdown post committed next to the image. Pure: identical
//! inputs always render byte-identical output.

use chrono::{DateTime, FixedOffset, SecondsFormat};
use serde_json::Value;

use crate::types::{ArticleDraft, ArtifactNames, LocationResolution};

const UNCATEGORIZED: &str = "uncategorized";

/// Render front matter, article body and the optional location section
pub fn build_markdown(
    draft: &ArticleDraft,
    names: &ArtifactNames,
    category: Option<&str>,
    location: &LocationResolution,
    published_at: DateTime<FixedOffset>,
) -> String {
    let category = category.unwrap_or(UNCATEGORIZED);

    let mut doc = String::from("---\n");
    doc.push_str(&format!("title: {}\n", Value::from(draft.title.as_str())));
    doc.push_str(&format!(
        "date: {}\n",
        published_at.to_rfc3339_opts(SecondsFormat::Millis, false)
    ));
    doc.push_str(&format!("tags: {}\n", Value::from(draft.tags.clone())));
    doc.push_str(&format!("categories: [{}]\n", Value::from(category)));
    doc.push_str(&format!("cover:\n  image: \"{}\"\n", names.cover_image));
    if let Some(coordinates) = location.coordinates() {
        doc.push_str(&format!(
            "location:\n  lat: {}\n  lng: {}\n",
            coordinates.lat, coordinates.lng
        ));
    }
    doc.push_str("---\n\n");
    doc.push_str(draft.content.trim());

    if location.address_text().is_some() || location.map_link().is_some() {
        doc.push_str("\n\n### 📍 Photographed at\n");
        if let Some(address) = location.address_text() {
            doc.push_str(address);
            doc.push_str("\n\n");
        }
        if let Some(link) = location.map_link() {
            doc.push_str(&format!("[View on Google Maps]({})", link));
        }
    }

    doc.push('\n');
    doc
}
