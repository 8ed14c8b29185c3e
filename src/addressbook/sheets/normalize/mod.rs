//! Maps raw address-book contacts onto fixed-width spreadsheet rows.
//!
//! Every attribute is extracted on its own: a missing or unreadable attribute
//! produces an empty cell and never affects its neighbours. Multi-valued
//! attributes are either spread over a fixed number of slots (emails, phones,
//! addresses) or joined into one cell with [`LIST_SEPARATOR`].

use crate::addressbook::sheets::model::{
    Attr, Birthday, Column, ColumnHeaders, ColumnLayout, InstantMessage, Labeled,
    NormalizedRow, PostalAddress, RawContact, SocialProfile,
};

/// Separator used for attributes rendered into a single cell.
pub const LIST_SEPARATOR: &str = "; ";
/// Number of positional email columns.
pub const EMAIL_SLOTS: usize = 3;
/// Number of positional phone columns, not counting the mobile column.
pub const PHONE_SLOTS: usize = 3;
/// Label fragments that route a phone number to the mobile column.
pub const MOBILE_LABEL_PATTERNS: [&str; 3] = ["mobile", "cell", "iphone"];

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Headers plus the rows normalized against them.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactTable {
    pub headers: ColumnHeaders,
    pub rows: Vec<NormalizedRow>,
}

/// Normalizes every contact against the header set of `layout`, preserving
/// source order.
pub fn build_table(contacts: &[RawContact], layout: ColumnLayout) -> ContactTable {
    let headers = ColumnHeaders::for_layout(layout);
    let rows = contacts
        .iter()
        .map(|contact| normalize_contact(contact, &headers))
        .collect();
    ContactTable { headers, rows }
}

/// Produces exactly one row with one cell per header.
pub fn normalize_contact(contact: &RawContact, headers: &ColumnHeaders) -> NormalizedRow {
    let fields = ContactFields::extract(contact);
    let cells = headers
        .columns()
        .iter()
        .map(|column| fields.cell(*column))
        .collect();
    NormalizedRow::new(cells)
}

/// Slot assignment computed once per contact, read column by column.
struct ContactFields<'a> {
    contact: &'a RawContact,
    emails: [String; EMAIL_SLOTS],
    phones: PhoneSlots,
    addresses: AddressSlots,
}

impl<'a> ContactFields<'a> {
    fn extract(contact: &'a RawContact) -> Self {
        Self {
            contact,
            emails: fill_email_slots(contact.emails.items()),
            phones: assign_phone_slots(contact.phones.items().as_slice()),
            addresses: classify_addresses(contact.addresses.items()),
        }
    }

    fn cell(&self, column: Column) -> String {
        let contact = self.contact;
        match column {
            Column::FirstName => text(&contact.first_name),
            Column::LastName => text(&contact.last_name),
            Column::MiddleName => text(&contact.middle_name),
            Column::Nickname => text(&contact.nickname),
            Column::Company => text(&contact.organization),
            Column::JobTitle => text(&contact.job_title),
            Column::Department => text(&contact.department),
            Column::Email1 => self.emails[0].clone(),
            Column::Email2 => self.emails[1].clone(),
            Column::Email3 => self.emails[2].clone(),
            Column::Phone1 => self.phones.positional[0].clone(),
            Column::Phone2 => self.phones.positional[1].clone(),
            Column::Phone3 => self.phones.positional[2].clone(),
            Column::Mobile => self.phones.mobile.clone(),
            Column::HomeAddress => self.addresses.home_cell(),
            Column::WorkAddress => self.addresses.work.clone().unwrap_or_default(),
            Column::Birthday => contact
                .birthday
                .present()
                .map(format_birthday)
                .unwrap_or_default(),
            Column::Notes => text(&contact.note),
            Column::Urls => join_cells(contact.urls.items().map(|url| flatten_lines(&url.value))),
            Column::SocialProfiles => {
                join_cells(contact.social_profiles.items().map(format_social_profile))
            }
            Column::InstantMessages => {
                join_cells(contact.instant_messages.items().map(format_instant_message))
            }
            Column::RelatedNames => join_cells(contact.relations.items().map(format_relation)),
            Column::ContactId => text(&contact.identifier),
            Column::Created => timestamp(&contact.created),
            Column::Modified => timestamp(&contact.modified),
        }
    }
}

fn text(attr: &Attr<String>) -> String {
    attr.present().map(|value| flatten_lines(value)).unwrap_or_default()
}

fn timestamp(attr: &Attr<chrono::DateTime<chrono::Utc>>) -> String {
    attr.present()
        .map(|value| value.format(TIMESTAMP_FORMAT).to_string())
        .unwrap_or_default()
}

fn is_line_break(ch: char) -> bool {
    matches!(
        ch,
        '\n' | '\r' | '\u{000B}' | '\u{000C}' | '\u{0085}' | '\u{2028}' | '\u{2029}'
    )
}

/// Collapses text onto a single line: every line-break variant splits the
/// text, each piece is trimmed, empty pieces are dropped and the rest are
/// joined with one space.
pub fn flatten_lines(value: &str) -> String {
    value
        .split(is_line_break)
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn join_cells(values: impl Iterator<Item = String>) -> String {
    values
        .filter(|value| !value.is_empty())
        .collect::<Vec<_>>()
        .join(LIST_SEPARATOR)
}

/// Keeps the first [`EMAIL_SLOTS`] non-empty emails in source order.
fn fill_email_slots<'v>(
    emails: impl Iterator<Item = &'v Labeled<String>>,
) -> [String; EMAIL_SLOTS] {
    let mut slots: [String; EMAIL_SLOTS] = Default::default();
    let kept = emails
        .map(|email| flatten_lines(&email.value))
        .filter(|value| !value.is_empty())
        .take(EMAIL_SLOTS);
    for (slot, value) in slots.iter_mut().zip(kept) {
        *slot = value;
    }
    slots
}

#[derive(Debug, Default, PartialEq)]
struct PhoneSlots {
    positional: [String; PHONE_SLOTS],
    mobile: String,
}

fn is_mobile_label(phone: &Labeled<String>) -> bool {
    MOBILE_LABEL_PATTERNS
        .iter()
        .any(|pattern| phone.label_contains(pattern))
}

/// Two passes: the first mobile-labelled number claims the mobile column,
/// then every other number fills the positional columns in source order.
fn assign_phone_slots(phones: &[Labeled<String>]) -> PhoneSlots {
    let values: Vec<String> = phones
        .iter()
        .map(|phone| flatten_lines(&phone.value))
        .collect();

    let reserved = phones
        .iter()
        .zip(&values)
        .position(|(phone, value)| !value.is_empty() && is_mobile_label(phone));

    let mut slots = PhoneSlots::default();
    if let Some(index) = reserved {
        slots.mobile = values[index].clone();
    }

    let positional = values
        .iter()
        .enumerate()
        .filter(|(index, value)| Some(*index) != reserved && !value.is_empty())
        .map(|(_, value)| value.clone())
        .take(PHONE_SLOTS);
    for (slot, value) in slots.positional.iter_mut().zip(positional) {
        *slot = value;
    }
    slots
}

#[derive(Debug, Default, PartialEq)]
struct AddressSlots {
    home: Option<String>,
    work: Option<String>,
    other: Option<String>,
}

impl AddressSlots {
    /// Home falls back to the first address that matched neither label.
    fn home_cell(&self) -> String {
        self.home
            .as_ref()
            .or(self.other.as_ref())
            .cloned()
            .unwrap_or_default()
    }
}

/// Home and work keep the last address seen for the label; unmatched labels
/// keep the first one seen.
fn classify_addresses<'v>(
    addresses: impl Iterator<Item = &'v Labeled<PostalAddress>>,
) -> AddressSlots {
    let mut slots = AddressSlots::default();
    for address in addresses {
        let collapsed = collapse_address(&address.value);
        if collapsed.is_empty() {
            continue;
        }
        if address.label_contains("home") {
            slots.home = Some(collapsed);
        } else if address.label_contains("work") {
            slots.work = Some(collapsed);
        } else if slots.other.is_none() {
            slots.other = Some(collapsed);
        }
    }
    slots
}

/// Joins the non-empty address components with single spaces.
pub fn collapse_address(address: &PostalAddress) -> String {
    address
        .components()
        .into_iter()
        .flatten()
        .map(flatten_lines)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// `M/D/YYYY` without padding; a birthday without a year renders as `M/D/`.
pub fn format_birthday(birthday: &Birthday) -> String {
    let year = birthday.year.map(|year| year.to_string()).unwrap_or_default();
    format!("{}/{}/{}", birthday.month, birthday.day, year)
}

fn format_social_profile(profile: &SocialProfile) -> String {
    let service = flatten_lines(&profile.service);
    let mut handle = flatten_lines(&profile.username);
    if handle.is_empty() {
        handle = profile.url.as_deref().map(flatten_lines).unwrap_or_default();
    }
    service_handle(service, handle)
}

fn format_instant_message(message: &Labeled<InstantMessage>) -> String {
    service_handle(
        flatten_lines(&message.value.service),
        flatten_lines(&message.value.username),
    )
}

fn service_handle(service: String, handle: String) -> String {
    match (service.is_empty(), handle.is_empty()) {
        (_, true) => String::new(),
        (true, false) => handle,
        (false, false) => format!("{service}: {handle}"),
    }
}

fn format_relation(relation: &Labeled<String>) -> String {
    let name = flatten_lines(&relation.value);
    let label = flatten_lines(relation.label_text());
    if name.is_empty() || label.is_empty() {
        name
    } else {
        format!("{label}: {name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phone(label: &str, value: &str) -> Labeled<String> {
        Labeled::new(label, value.to_string())
    }

    fn cell<'r>(row: &'r NormalizedRow, headers: &ColumnHeaders, column: Column) -> &'r str {
        let index = headers.position(column).expect("column in layout");
        row.get(index).expect("cell present")
    }

    #[test]
    fn flatten_lines_handles_every_break_variant() {
        let note = "one\r\ntwo\rthree\nfour\u{2028}five\u{2029}six\u{0085}seven";
        assert_eq!(flatten_lines(note), "one two three four five six seven");
    }

    #[test]
    fn flatten_lines_drops_blank_lines_and_edge_whitespace() {
        assert_eq!(flatten_lines("  first  \n\n\n   second "), "first second");
        assert_eq!(flatten_lines("\n\r\n"), "");
    }

    #[test]
    fn mobile_label_wins_over_position() {
        let phones = vec![
            phone("home", "111"),
            phone("work", "222"),
            phone("other", "333"),
            phone("_$!<Mobile>!$_", "444"),
        ];
        let slots = assign_phone_slots(&phones);
        assert_eq!(slots.mobile, "444");
        assert_eq!(slots.positional, ["111", "222", "333"].map(String::from));
    }

    #[test]
    fn cell_and_iphone_labels_count_as_mobile() {
        assert_eq!(assign_phone_slots(&[phone("Cell", "1")]).mobile, "1");
        assert_eq!(assign_phone_slots(&[phone("iPhone", "2")]).mobile, "2");
    }

    #[test]
    fn second_mobile_number_falls_back_to_positional_slot() {
        let phones = vec![phone("mobile", "1"), phone("mobile", "2")];
        let slots = assign_phone_slots(&phones);
        assert_eq!(slots.mobile, "1");
        assert_eq!(slots.positional[0], "2");
        assert_eq!(slots.positional[1], "");
    }

    #[test]
    fn excess_phones_are_dropped_in_source_order() {
        let phones: Vec<_> = (1..=6).map(|n| phone("work", &n.to_string())).collect();
        let slots = assign_phone_slots(&phones);
        assert_eq!(slots.positional, ["1", "2", "3"].map(String::from));
        assert_eq!(slots.mobile, "");
    }

    #[test]
    fn later_home_address_replaces_earlier_one() {
        let first = PostalAddress {
            street: Some("1 Old Rd".into()),
            ..Default::default()
        };
        let second = PostalAddress {
            street: Some("2 New Rd".into()),
            ..Default::default()
        };
        let addresses = [Labeled::new("home", first), Labeled::new("Home", second)];
        let slots = classify_addresses(addresses.iter());
        assert_eq!(slots.home.as_deref(), Some("2 New Rd"));
    }

    #[test]
    fn unmatched_address_fills_home_only_when_no_home_exists() {
        let school = PostalAddress {
            city: Some("Oxford".into()),
            ..Default::default()
        };
        let cottage = PostalAddress {
            city: Some("Bath".into()),
            ..Default::default()
        };
        let only_other = [Labeled::new("school", school.clone())];
        assert_eq!(classify_addresses(only_other.iter()).home_cell(), "Oxford");

        let with_home = [Labeled::new("school", school), Labeled::new("home", cottage)];
        assert_eq!(classify_addresses(with_home.iter()).home_cell(), "Bath");
    }

    #[test]
    fn address_components_join_with_single_spaces() {
        let address = PostalAddress {
            street: Some("221B Baker St\nFlat 2".into()),
            city: Some("London".into()),
            state: None,
            postal_code: Some(" NW1 6XE ".into()),
            country: Some("UK".into()),
        };
        assert_eq!(collapse_address(&address), "221B Baker St Flat 2 London NW1 6XE UK");
    }

    #[test]
    fn birthday_without_year_keeps_trailing_separator() {
        let birthday = Birthday {
            month: 7,
            day: 4,
            year: None,
        };
        assert_eq!(format_birthday(&birthday), "7/4/");
        let full = Birthday {
            month: 12,
            day: 25,
            year: Some(1990),
        };
        assert_eq!(format_birthday(&full), "12/25/1990");
    }

    #[test]
    fn social_profiles_render_service_and_handle() {
        let contact = RawContact {
            social_profiles: Attr::Present(vec![
                SocialProfile {
                    service: "Twitter".into(),
                    username: "ada".into(),
                    url: None,
                },
                SocialProfile {
                    service: "LinkedIn".into(),
                    username: String::new(),
                    url: Some("https://linkedin.com/in/ada".into()),
                },
                SocialProfile::default(),
            ]),
            ..Default::default()
        };
        let headers = ColumnHeaders::default();
        let row = normalize_contact(&contact, &headers);
        assert_eq!(
            cell(&row, &headers, Column::SocialProfiles),
            "Twitter: ada; LinkedIn: https://linkedin.com/in/ada"
        );
    }

    #[test]
    fn full_layout_renders_relations_and_messages() {
        let contact = RawContact {
            relations: Attr::Present(vec![
                Labeled::new("_$!<Spouse>!$_", "Grace".to_string()),
                Labeled::unlabeled("Alan".to_string()),
            ]),
            instant_messages: Attr::Present(vec![Labeled::new(
                "work",
                InstantMessage {
                    service: "Skype".into(),
                    username: "ada.l".into(),
                },
            )]),
            identifier: "ABC-123".into(),
            ..Default::default()
        };
        let headers = ColumnHeaders::for_layout(ColumnLayout::Full);
        let row = normalize_contact(&contact, &headers);
        assert_eq!(cell(&row, &headers, Column::RelatedNames), "Spouse: Grace; Alan");
        assert_eq!(cell(&row, &headers, Column::InstantMessages), "Skype: ada.l");
        assert_eq!(cell(&row, &headers, Column::ContactId), "ABC-123");
        assert_eq!(cell(&row, &headers, Column::Created), "");
    }

    #[test]
    fn relation_labels_are_flattened() {
        let contact = RawContact {
            relations: Attr::Present(vec![Labeled::new("Best\nFriend", "Grace".to_string())]),
            ..Default::default()
        };
        let headers = ColumnHeaders::for_layout(ColumnLayout::Full);
        let row = normalize_contact(&contact, &headers);
        assert_eq!(cell(&row, &headers, Column::RelatedNames), "Best Friend: Grace");
    }

    #[test]
    fn unreadable_attribute_leaves_neighbours_intact() {
        let contact = RawContact {
            first_name: "Ada".into(),
            last_name: Attr::Unreadable("not a string".into()),
            organization: "Analytical Engines".into(),
            ..Default::default()
        };
        let headers = ColumnHeaders::default();
        let row = normalize_contact(&contact, &headers);
        assert_eq!(cell(&row, &headers, Column::FirstName), "Ada");
        assert_eq!(cell(&row, &headers, Column::LastName), "");
        assert_eq!(cell(&row, &headers, Column::Company), "Analytical Engines");
    }

    #[test]
    fn timestamps_render_in_utc() {
        use chrono::TimeZone;
        let created = chrono::Utc
            .with_ymd_and_hms(2024, 2, 29, 8, 5, 0)
            .single()
            .expect("valid timestamp");
        let contact = RawContact {
            created: Attr::Present(created),
            ..Default::default()
        };
        let headers = ColumnHeaders::for_layout(ColumnLayout::Full);
        let row = normalize_contact(&contact, &headers);
        assert_eq!(cell(&row, &headers, Column::Created), "2024-02-29 08:05:00");
    }

    #[test]
    fn build_table_preserves_source_order() {
        let contacts = vec![
            RawContact {
                first_name: "B".into(),
                ..Default::default()
            },
            RawContact {
                first_name: "A".into(),
                ..Default::default()
            },
        ];
        let table = build_table(&contacts, ColumnLayout::Standard);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].get(0), Some("B"));
        assert_eq!(table.rows[1].get(0), Some("A"));
    }
}
