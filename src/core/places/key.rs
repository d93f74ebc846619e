use crate::core::places::PlaceDraft;

const KEY_PREFIX_NAME_ADDR: &str = "nameaddr";
const KEY_PREFIX_COORDS: &str = "coords";
const KEY_PREFIX_ID: &str = "id";

/// Normalizes a display string for key purposes: trimmed, lowercased,
/// inner whitespace collapsed, trailing `,.;:` removed
pub fn normalize(value: &str) -> String {
    let collapsed = value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    collapsed
        .trim_end_matches([',', '.', ';', ':'])
        .to_string()
}

/// Six decimals the way stored keys were written by the web client:
/// exact ties round away from zero, a sign is kept for any negative
/// input and negative zero prints unsigned.
fn fixed6(value: f64) -> String {
    let magnitude = value.abs();
    let scaled = magnitude * 1e6;

    // a tie needs at most seven binary fraction digits, so both products are exact
    let tie = (magnitude * 128.0).fract() == 0.0 && scaled.fract() == 0.5;
    let digits = if tie && scaled < 1e15 {
        let units = scaled.ceil() as u64;
        format!("{}.{:06}", units / 1_000_000, units % 1_000_000)
    } else {
        format!("{:.6}", magnitude)
    };

    if value < 0.0 {
        format!("-{digits}")
    } else {
        digits
    }
}

/// Derives the stable favourite key for a place description.
///
/// Priority: normalized name + address, then coordinates at six
/// decimals, then the raw source id. Returns `None` when none of
/// these are usable; the caller must disable the heart control.
pub fn derive_key(draft: &PlaceDraft) -> Option<String> {
    let name = draft.name.as_deref().map(normalize).unwrap_or_default();
    let address = draft.address.as_deref().map(normalize).unwrap_or_default();

    if !name.is_empty() && !address.is_empty() {
        return Some(format!("{KEY_PREFIX_NAME_ADDR}|{name}|{address}"));
    }

    if let Some(coords) = draft.coordinates.filter(|c| c.is_finite()) {
        return Some(format!(
            "{KEY_PREFIX_COORDS}|{},{}",
            fixed6(coords.lng),
            fixed6(coords.lat)
        ));
    }

    draft
        .source_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .map(|id| format!("{KEY_PREFIX_ID}|{id}"))
}
