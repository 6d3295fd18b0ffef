//! Wire types for the board API `/Office` endpoint.

use serde::Deserialize;

use super::FetchError;
use crate::types::{normalize_phone, OfficeRecord};

/// Office classification retained in the directory.
pub const FIRM_OFFICE_TYPE: &str = "Firm";

/// Social-media entry type that carries the office website.
pub const WEBSITE_MEDIA_TYPE: &str = "Website";

/// One office as returned by the API. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ApiOffice {
    #[serde(default)]
    pub office_national_association_id: Option<String>,
    #[serde(default)]
    pub office_name: Option<String>,
    #[serde(default)]
    pub office_address1: Option<String>,
    #[serde(default)]
    pub office_address2: Option<String>,
    #[serde(default)]
    pub office_city: Option<String>,
    #[serde(default)]
    pub office_state_or_province: Option<String>,
    #[serde(default)]
    pub office_postal_code: Option<String>,
    #[serde(default)]
    pub office_phone: Option<String>,
    #[serde(default)]
    pub office_fax: Option<String>,
    #[serde(default)]
    pub office_email: Option<String>,
    #[serde(default)]
    pub office_type: Option<String>,
    #[serde(default)]
    pub office_social_media: Option<Vec<SocialMedia>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SocialMedia {
    #[serde(default)]
    pub social_media_type: Option<String>,
    #[serde(default)]
    pub social_media_url_or_id: Option<String>,
}

impl ApiOffice {
    pub fn is_firm(&self) -> bool {
        self.office_type.as_deref() == Some(FIRM_OFFICE_TYPE)
    }

    /// URL of the first "Website" social-media entry, or "" when there is none.
    pub fn website_url(&self) -> String {
        self.office_social_media
            .iter()
            .flatten()
            .find(|m| m.social_media_type.as_deref() == Some(WEBSITE_MEDIA_TYPE))
            .and_then(|m| m.social_media_url_or_id.clone())
            .unwrap_or_default()
    }

    /// Convert into a directory record. Returns `None` when the office has no id.
    pub fn into_record(self) -> Option<OfficeRecord> {
        let website_url = self.website_url();
        let id = self
            .office_national_association_id
            .filter(|id| !id.trim().is_empty())?;
        let phone_normalized = self
            .office_phone
            .as_deref()
            .map(normalize_phone)
            .unwrap_or_default();

        Some(OfficeRecord {
            national_association_id: id,
            name: self.office_name.unwrap_or_default(),
            address1: self.office_address1,
            address2: self.office_address2,
            city: self.office_city,
            state_or_province: self.office_state_or_province,
            postal_code: self.office_postal_code,
            phone: self.office_phone,
            phone_normalized,
            fax: self.office_fax,
            email: self.office_email,
            website_url,
        })
    }
}

/// Decode one page body. Accepts `{ "data": [...], "pagination": {...} }` or a bare array.
pub fn parse_office_page(body: &str) -> Result<Vec<ApiOffice>, FetchError> {
    let json: serde_json::Value = serde_json::from_str(body)?;

    match json {
        serde_json::Value::Array(_) => Ok(serde_json::from_value(json)?),
        serde_json::Value::Object(mut map) => match map.remove("data") {
            Some(data @ serde_json::Value::Array(_)) => Ok(serde_json::from_value(data)?),
            Some(other) => Err(FetchError::UnexpectedShape(format!(
                "'data' is not an array: {}",
                truncate(&other.to_string())
            ))),
            None => Err(FetchError::UnexpectedShape(format!(
                "missing 'data' in {}",
                truncate(body)
            ))),
        },
        other => Err(FetchError::UnexpectedShape(truncate(&other.to_string()))),
    }
}

fn truncate(s: &str) -> String {
    const MAX: usize = 200;
    match s.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}
