use chrono::{DateTime, Utc};

mod columns;

pub use columns::{Column, ColumnHeaders, ColumnLayout};

/// Outcome of reading one attribute from the address book.
///
/// Readers record a fault on a single attribute as [`Attr::Unreadable`]
/// instead of aborting the contact, so the normalizer can treat every
/// attribute in isolation.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Attr<T> {
    /// The attribute was read successfully.
    Present(T),
    /// The contact does not carry the attribute.
    #[default]
    Missing,
    /// The attribute exists but could not be decoded.
    Unreadable(String),
}

impl<T> Attr<T> {
    /// Returns the value when it was read successfully.
    pub fn present(&self) -> Option<&T> {
        match self {
            Attr::Present(value) => Some(value),
            Attr::Missing | Attr::Unreadable(_) => None,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Attr::Present(_))
    }

    pub fn is_unreadable(&self) -> bool {
        matches!(self, Attr::Unreadable(_))
    }
}

impl<T> Attr<Vec<T>> {
    /// Iterates the values of a multi-valued attribute, yielding nothing when
    /// the attribute is missing or unreadable.
    pub fn items(&self) -> std::slice::Iter<'_, T> {
        let values: &[T] = match self {
            Attr::Present(values) => values,
            Attr::Missing | Attr::Unreadable(_) => &[],
        };
        values.iter()
    }
}

impl<T> From<T> for Attr<T> {
    fn from(value: T) -> Self {
        Attr::Present(value)
    }
}

impl From<&str> for Attr<String> {
    fn from(value: &str) -> Self {
        Attr::Present(value.to_string())
    }
}

/// A value paired with the address-book label it was filed under.
#[derive(Debug, Clone, PartialEq)]
pub struct Labeled<T> {
    pub label: Option<String>,
    pub value: T,
}

impl<T> Labeled<T> {
    pub fn new(label: impl Into<String>, value: T) -> Self {
        Self {
            label: Some(label.into()),
            value,
        }
    }

    pub fn unlabeled(value: T) -> Self {
        Self { label: None, value }
    }

    /// Label text with address-book wrappers such as `_$!<Mobile>!$_`
    /// removed. Unlabeled values yield an empty string.
    pub fn label_text(&self) -> &str {
        let Some(label) = self.label.as_deref() else {
            return "";
        };
        let trimmed = label.trim();
        trimmed
            .strip_prefix("_$!<")
            .and_then(|inner| inner.strip_suffix(">!$_"))
            .unwrap_or(trimmed)
    }

    /// Case-insensitive substring match against the unwrapped label.
    pub fn label_contains(&self, needle: &str) -> bool {
        self.label_text()
            .to_lowercase()
            .contains(&needle.to_lowercase())
    }
}

/// Month/day birthday with an optional year, as address books allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Birthday {
    pub month: u32,
    pub day: u32,
    pub year: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PostalAddress {
    pub street: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

impl PostalAddress {
    /// Components in the order they are collapsed into a single cell.
    pub fn components(&self) -> [Option<&str>; 5] {
        [
            self.street.as_deref(),
            self.city.as_deref(),
            self.state.as_deref(),
            self.postal_code.as_deref(),
            self.country.as_deref(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SocialProfile {
    pub service: String,
    pub username: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct InstantMessage {
    pub service: String,
    pub username: String,
}

/// One address-book entry as delivered by a reader. Every attribute is read
/// independently; nothing here is guaranteed to be present.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawContact {
    pub first_name: Attr<String>,
    pub last_name: Attr<String>,
    pub middle_name: Attr<String>,
    pub nickname: Attr<String>,
    pub organization: Attr<String>,
    pub job_title: Attr<String>,
    pub department: Attr<String>,
    pub birthday: Attr<Birthday>,
    pub note: Attr<String>,
    pub identifier: Attr<String>,
    pub created: Attr<DateTime<Utc>>,
    pub modified: Attr<DateTime<Utc>>,
    pub emails: Attr<Vec<Labeled<String>>>,
    pub phones: Attr<Vec<Labeled<String>>>,
    pub addresses: Attr<Vec<Labeled<PostalAddress>>>,
    pub urls: Attr<Vec<Labeled<String>>>,
    pub social_profiles: Attr<Vec<SocialProfile>>,
    pub instant_messages: Attr<Vec<Labeled<InstantMessage>>>,
    pub relations: Attr<Vec<Labeled<String>>>,
}

impl RawContact {
    /// Number of attributes that a reader flagged as unreadable.
    pub fn unreadable_count(&self) -> usize {
        [
            self.first_name.is_unreadable(),
            self.last_name.is_unreadable(),
            self.middle_name.is_unreadable(),
            self.nickname.is_unreadable(),
            self.organization.is_unreadable(),
            self.job_title.is_unreadable(),
            self.department.is_unreadable(),
            self.birthday.is_unreadable(),
            self.note.is_unreadable(),
            self.identifier.is_unreadable(),
            self.created.is_unreadable(),
            self.modified.is_unreadable(),
            self.emails.is_unreadable(),
            self.phones.is_unreadable(),
            self.addresses.is_unreadable(),
            self.urls.is_unreadable(),
            self.social_profiles.is_unreadable(),
            self.instant_messages.is_unreadable(),
            self.relations.is_unreadable(),
        ]
        .into_iter()
        .filter(|flag| *flag)
        .count()
    }
}

/// Fixed-width row produced for one contact. The cell count always equals
/// the header count of the run that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRow(Vec<String>);

impl NormalizedRow {
    pub fn new(cells: Vec<String>) -> Self {
        Self(cells)
    }

    pub fn cells(&self) -> &[String] {
        &self.0
    }

    pub fn into_cells(self) -> Vec<String> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_text_unwraps_address_book_markers() {
        let phone = Labeled::new("_$!<Mobile>!$_", "555".to_string());
        assert_eq!(phone.label_text(), "Mobile");
        assert!(phone.label_contains("mobile"));
    }

    #[test]
    fn unlabeled_values_never_match() {
        let email = Labeled::unlabeled("a@example.com".to_string());
        assert_eq!(email.label_text(), "");
        assert!(!email.label_contains("home"));
    }

    #[test]
    fn unreadable_attributes_expose_no_value() {
        let attr: Attr<String> = Attr::Unreadable("bad encoding".into());
        assert!(attr.present().is_none());
        let list: Attr<Vec<Labeled<String>>> = Attr::Unreadable("bad list".into());
        assert_eq!(list.items().count(), 0);
    }

    #[test]
    fn unreadable_count_tallies_flagged_attributes() {
        let contact = RawContact {
            first_name: "Ada".into(),
            note: Attr::Unreadable("invalid utf-8".into()),
            phones: Attr::Unreadable("truncated".into()),
            ..Default::default()
        };
        assert_eq!(contact.unreadable_count(), 2);
    }
}
