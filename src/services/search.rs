//! Directory search over the cached offices.

use crate::db::{DbError, OfficeStore};
use crate::state::DirectoryState;
use crate::types::{normalize_phone, OfficeRecord};

/// Fewest digits a term needs before it is also matched against phone numbers.
const MIN_PHONE_DIGITS: usize = 3;

/// Offices matching `term`, ordered by name. An empty term lists everything.
pub fn search_offices(state: &DirectoryState, term: &str) -> Result<Vec<OfficeRecord>, DbError> {
    let offices = state.store().list_offices()?;
    let matches = filter_offices(offices, term);
    log::debug!("Search '{}': {} match(es)", term.trim(), matches.len());
    Ok(matches)
}

pub fn filter_offices(offices: Vec<OfficeRecord>, term: &str) -> Vec<OfficeRecord> {
    let needle = term.trim().to_lowercase();
    if needle.is_empty() {
        return offices;
    }

    let digits = normalize_phone(&needle);
    let phone_needle = (digits.len() >= MIN_PHONE_DIGITS).then_some(digits);

    offices
        .into_iter()
        .filter(|office| matches_office(office, &needle, phone_needle.as_deref()))
        .collect()
}

fn matches_office(office: &OfficeRecord, needle: &str, phone_needle: Option<&str>) -> bool {
    let text_fields = [
        Some(office.name.as_str()),
        office.address1.as_deref(),
        office.address2.as_deref(),
        office.city.as_deref(),
        office.state_or_province.as_deref(),
        office.postal_code.as_deref(),
        office.email.as_deref(),
        Some(office.website_url.as_str()),
    ];

    let text_hit = text_fields
        .iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(needle));

    text_hit || phone_needle.is_some_and(|digits| office.phone_normalized.contains(digits))
}
