use std::fs;
use std::path::Path;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::addressbook::sheets::error::{ExportError, Result};
use crate::addressbook::sheets::io::vcard;
use crate::addressbook::sheets::model::{
    Attr, Birthday, InstantMessage, Labeled, PostalAddress, RawContact, SocialProfile,
};

/// Address-book export formats understood by [`read_contacts`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    VCard,
    Json,
}

/// Contacts read from a source plus the number of entries that had to be
/// skipped because they could not be read at all.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SourceRead {
    pub contacts: Vec<RawContact>,
    pub skipped: usize,
}

impl SourceRead {
    /// Every entry encountered, readable or not.
    pub fn seen(&self) -> usize {
        self.contacts.len() + self.skipped
    }
}

/// Detects the source format from the file extension.
pub fn detect_format(path: &Path) -> Option<SourceFormat> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "vcf" | "vcard" => Some(SourceFormat::VCard),
        "json" => Some(SourceFormat::Json),
        _ => None,
    }
}

/// Reads every contact from an exported address book.
#[instrument(level = "info", skip_all, fields(input = %path.display()))]
pub fn read_contacts(path: &Path) -> Result<SourceRead> {
    if !path.exists() {
        return Err(ExportError::MissingInput(path.to_path_buf()));
    }
    let format =
        detect_format(path).ok_or_else(|| ExportError::UnsupportedSource(path.to_path_buf()))?;
    let source = fs::read_to_string(path)?;
    let read = match format {
        SourceFormat::VCard => vcard::parse_vcards(&source),
        SourceFormat::Json => parse_json_contacts(&source)?,
    };
    info!(
        contacts = read.contacts.len(),
        skipped = read.skipped,
        ?format,
        "read address book"
    );
    Ok(read)
}

/// Parses a JSON export: either an array of contact objects or an object
/// with a `contacts` array. Entries that are not objects are skipped.
pub fn parse_json_contacts(source: &str) -> Result<SourceRead> {
    let document: Value = serde_json::from_str(source)?;
    let entries = match document {
        Value::Array(entries) => entries,
        Value::Object(mut object) => match object.remove("contacts") {
            Some(Value::Array(entries)) => entries,
            _ => {
                return Err(ExportError::InvalidSource(
                    "expected a contacts array".into(),
                ));
            }
        },
        _ => {
            return Err(ExportError::InvalidSource(
                "expected JSON array or object".into(),
            ));
        }
    };

    let mut read = SourceRead::default();
    for (index, entry) in entries.into_iter().enumerate() {
        match entry {
            Value::Object(object) => read.contacts.push(contact_from_json(&object)),
            other => {
                warn!(index, kind = json_kind(&other), "skipping unreadable contact entry");
                read.skipped += 1;
            }
        }
    }
    Ok(read)
}

fn contact_from_json(object: &Map<String, Value>) -> RawContact {
    RawContact {
        first_name: string_attr(object, "first_name"),
        last_name: string_attr(object, "last_name"),
        middle_name: string_attr(object, "middle_name"),
        nickname: string_attr(object, "nickname"),
        organization: string_attr(object, "organization"),
        job_title: string_attr(object, "job_title"),
        department: string_attr(object, "department"),
        birthday: birthday_attr(object.get("birthday")),
        note: string_attr(object, "note"),
        identifier: string_attr(object, "identifier"),
        created: timestamp_attr(object.get("created")),
        modified: timestamp_attr(object.get("modified")),
        emails: list_attr(object, "emails", labeled_string),
        phones: list_attr(object, "phones", labeled_string),
        addresses: list_attr(object, "addresses", labeled_address),
        urls: list_attr(object, "urls", labeled_string),
        social_profiles: list_attr(object, "social_profiles", social_profile),
        instant_messages: list_attr(object, "instant_messages", instant_message),
        relations: list_attr(object, "relations", labeled_string),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn string_attr(object: &Map<String, Value>, key: &str) -> Attr<String> {
    match object.get(key) {
        None | Some(Value::Null) => Attr::Missing,
        Some(Value::String(value)) => Attr::Present(value.clone()),
        Some(other) => Attr::Unreadable(format!("expected string, found {}", json_kind(other))),
    }
}

fn optional_string(object: &Map<String, Value>, key: &str) -> Option<String> {
    object.get(key).and_then(Value::as_str).map(str::to_string)
}

fn list_attr<T>(
    object: &Map<String, Value>,
    key: &str,
    parse_item: fn(&Value) -> Option<T>,
) -> Attr<Vec<T>> {
    match object.get(key) {
        None | Some(Value::Null) => Attr::Missing,
        Some(Value::Array(items)) => {
            let parsed: Vec<T> = items
                .iter()
                .filter_map(|item| {
                    let value = parse_item(item);
                    if value.is_none() {
                        debug!(key, "ignoring unreadable list item");
                    }
                    value
                })
                .collect();
            if parsed.is_empty() {
                Attr::Missing
            } else {
                Attr::Present(parsed)
            }
        }
        Some(other) => Attr::Unreadable(format!("expected array, found {}", json_kind(other))),
    }
}

fn labeled_string(item: &Value) -> Option<Labeled<String>> {
    match item {
        Value::String(value) => Some(Labeled::unlabeled(value.clone())),
        Value::Object(object) => Some(Labeled {
            label: optional_string(object, "label"),
            value: object.get("value")?.as_str()?.to_string(),
        }),
        _ => None,
    }
}

fn labeled_address(item: &Value) -> Option<Labeled<PostalAddress>> {
    let object = item.as_object()?;
    Some(Labeled {
        label: optional_string(object, "label"),
        value: PostalAddress {
            street: optional_string(object, "street"),
            city: optional_string(object, "city"),
            state: optional_string(object, "state"),
            postal_code: optional_string(object, "postal_code"),
            country: optional_string(object, "country"),
        },
    })
}

fn social_profile(item: &Value) -> Option<SocialProfile> {
    let object = item.as_object()?;
    Some(SocialProfile {
        service: optional_string(object, "service").unwrap_or_default(),
        username: optional_string(object, "username").unwrap_or_default(),
        url: optional_string(object, "url"),
    })
}

fn instant_message(item: &Value) -> Option<Labeled<InstantMessage>> {
    let object = item.as_object()?;
    Some(Labeled {
        label: optional_string(object, "label"),
        value: InstantMessage {
            service: optional_string(object, "service").unwrap_or_default(),
            username: optional_string(object, "username")?,
        },
    })
}

fn birthday_attr(value: Option<&Value>) -> Attr<Birthday> {
    match value {
        None | Some(Value::Null) => Attr::Missing,
        Some(Value::String(raw)) => parse_birthday(raw)
            .map(Attr::Present)
            .unwrap_or_else(|| Attr::Unreadable(format!("invalid birthday '{raw}'"))),
        Some(Value::Object(object)) => {
            let month = object
                .get("month")
                .and_then(Value::as_u64)
                .and_then(|month| u32::try_from(month).ok());
            let day = object
                .get("day")
                .and_then(Value::as_u64)
                .and_then(|day| u32::try_from(day).ok());
            let year = object
                .get("year")
                .and_then(Value::as_i64)
                .and_then(|year| i32::try_from(year).ok());
            match (month, day) {
                (Some(month), Some(day)) => build_birthday(month, day, year)
                    .map(Attr::Present)
                    .unwrap_or_else(|| Attr::Unreadable("birthday out of range".into())),
                _ => Attr::Unreadable("birthday requires month and day".into()),
            }
        }
        Some(other) => Attr::Unreadable(format!("expected birthday, found {}", json_kind(other))),
    }
}

fn timestamp_attr(value: Option<&Value>) -> Attr<DateTime<Utc>> {
    match value {
        None | Some(Value::Null) => Attr::Missing,
        Some(Value::String(raw)) => parse_timestamp(raw)
            .map(Attr::Present)
            .unwrap_or_else(|| Attr::Unreadable(format!("invalid timestamp '{raw}'"))),
        Some(other) => Attr::Unreadable(format!("expected timestamp, found {}", json_kind(other))),
    }
}

fn build_birthday(month: u32, day: u32, year: Option<i32>) -> Option<Birthday> {
    let valid = match year {
        Some(year) => NaiveDate::from_ymd_opt(year, month, day).is_some(),
        // 2000 is a leap year, so Feb 29 is accepted without a year.
        None => NaiveDate::from_ymd_opt(2000, month, day).is_some(),
    };
    valid.then_some(Birthday { month, day, year })
}

/// Accepts `YYYY-MM-DD`, `YYYYMMDD`, `--MM-DD` and `--MMDD`, optionally
/// followed by a `T` time part which is ignored.
pub fn parse_birthday(raw: &str) -> Option<Birthday> {
    let date = raw.trim().split('T').next()?;
    if let Some(rest) = date.strip_prefix("--") {
        let digits: String = rest.chars().filter(|ch| *ch != '-').collect();
        if digits.len() != 4 || !digits.bytes().all(|byte| byte.is_ascii_digit()) {
            return None;
        }
        let month = digits[..2].parse().ok()?;
        let day = digits[2..].parse().ok()?;
        return build_birthday(month, day, None);
    }

    let parsed = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(date, "%Y%m%d"))
        .ok()?;
    build_birthday(parsed.month(), parsed.day(), Some(parsed.year()))
}

/// Accepts RFC 3339 and the basic `YYYYMMDDTHHMMSSZ` form used by vCard.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y%m%dT%H%M%SZ")
        .ok()
        .map(|naive| naive.and_utc())
}
