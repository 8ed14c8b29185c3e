//! Minimal vCard 3.0/4.0 reader covering the properties address books emit
//! for the exported columns.
//!
//! Lines are unfolded, split into `BEGIN:VCARD`/`END:VCARD` blocks and parsed
//! property by property. A property that fails to decode marks only its own
//! attribute unreadable; a card without `END:VCARD` is skipped.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::addressbook::sheets::io::source::{SourceRead, parse_birthday, parse_timestamp};
use crate::addressbook::sheets::model::{
    Attr, InstantMessage, Labeled, PostalAddress, RawContact, SocialProfile,
};

/// `TYPE` values that describe transport or preference rather than a label.
const IGNORED_TYPES: [&str; 6] = ["pref", "internet", "voice", "x400", "text", "uri"];

/// Parses every card in `source`.
pub fn parse_vcards(source: &str) -> SourceRead {
    let mut read = SourceRead::default();
    let mut current: Option<Vec<ContentLine>> = None;

    for line in unfold_lines(source) {
        let Some(content) = ContentLine::parse(&line) else {
            if !line.trim().is_empty() {
                debug!("ignoring malformed vCard line");
            }
            continue;
        };

        let is_card_marker = content.value.trim().eq_ignore_ascii_case("VCARD");
        match content.name.as_str() {
            "BEGIN" if is_card_marker => {
                if current.replace(Vec::new()).is_some() {
                    warn!("vCard missing END:VCARD; skipping it");
                    read.skipped += 1;
                }
            }
            "END" if is_card_marker => match current.take() {
                Some(lines) => read.contacts.push(build_contact(&lines)),
                None => debug!("ignoring END:VCARD without BEGIN"),
            },
            _ => match current.as_mut() {
                Some(lines) => lines.push(content),
                None => debug!(property = %content.name, "ignoring property outside a vCard"),
            },
        }
    }

    if current.is_some() {
        warn!("vCard missing END:VCARD at end of input; skipping it");
        read.skipped += 1;
    }
    read
}

/// Joins folded continuation lines (a line break followed by a space or tab).
fn unfold_lines(source: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    for raw in source.lines() {
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        if let (Some(continuation), Some(previous)) =
            (raw.strip_prefix([' ', '\t']), lines.last_mut())
        {
            previous.push_str(continuation);
            continue;
        }
        lines.push(raw.to_string());
    }
    lines
}

#[derive(Debug, Clone, PartialEq)]
struct ContentLine {
    group: Option<String>,
    name: String,
    params: Vec<(String, String)>,
    value: String,
}

impl ContentLine {
    fn parse(line: &str) -> Option<Self> {
        let colon = find_unquoted(line, ':')?;
        let (head, value) = (&line[..colon], &line[colon + 1..]);

        let mut segments = split_unquoted(head, ';').into_iter();
        let qualified = segments.next()?.trim().to_string();
        if qualified.is_empty() {
            return None;
        }
        let (group, name) = match qualified.rsplit_once('.') {
            Some((group, name)) => (Some(group.to_ascii_lowercase()), name.to_ascii_uppercase()),
            None => (None, qualified.to_ascii_uppercase()),
        };

        let params = segments
            .map(|segment| match segment.split_once('=') {
                Some((key, value)) => (
                    key.trim().to_ascii_uppercase(),
                    value.trim().trim_matches('"').to_string(),
                ),
                // vCard 2.1 bare parameters such as `TEL;HOME:`
                None => ("TYPE".to_string(), segment.trim().to_string()),
            })
            .collect();

        Some(Self {
            group,
            name,
            params,
            value: value.to_string(),
        })
    }

    fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    /// First `TYPE` value that names a label rather than a transport.
    fn type_label(&self) -> Option<String> {
        self.params
            .iter()
            .filter(|(name, _)| name == "TYPE")
            .flat_map(|(_, value)| value.split(','))
            .map(str::trim)
            .find(|value| {
                !value.is_empty() && !IGNORED_TYPES.contains(&value.to_ascii_lowercase().as_str())
            })
            .map(str::to_string)
    }
}

fn find_unquoted(text: &str, target: char) -> Option<usize> {
    let mut quoted = false;
    for (index, ch) in text.char_indices() {
        match ch {
            '"' => quoted = !quoted,
            _ if ch == target && !quoted => return Some(index),
            _ => {}
        }
    }
    None
}

fn split_unquoted(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut rest = text;
    while let Some(index) = find_unquoted(rest, separator) {
        parts.push(&rest[..index]);
        rest = &rest[index + separator.len_utf8()..];
    }
    parts.push(rest);
    parts
}

/// Decodes `\n`, `\,`, `\;` and `\\` escapes.
fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Splits a structured value on unescaped `;` and unescapes each component.
fn components(value: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut escaped = false;
    for ch in value.chars() {
        if escaped {
            current.push('\\');
            current.push(ch);
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == ';' {
            parts.push(unescape(&current));
            current.clear();
        } else {
            current.push(ch);
        }
    }
    if escaped {
        current.push('\\');
    }
    parts.push(unescape(&current));
    parts
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn set_once<T>(attr: &mut Attr<T>, value: Attr<T>) {
    if matches!(attr, Attr::Missing) {
        *attr = value;
    }
}

fn text_attr(value: &str) -> Attr<String> {
    let value = unescape(value);
    if value.trim().is_empty() {
        Attr::Missing
    } else {
        Attr::Present(value)
    }
}

fn into_attr<T>(values: Vec<T>) -> Attr<Vec<T>> {
    if values.is_empty() {
        Attr::Missing
    } else {
        Attr::Present(values)
    }
}

fn build_contact(lines: &[ContentLine]) -> RawContact {
    // Apple exports custom labels as `itemN.X-ABLABEL` next to the grouped property.
    let group_labels: HashMap<&str, String> = lines
        .iter()
        .filter(|line| line.name == "X-ABLABEL")
        .filter_map(|line| Some((line.group.as_deref()?, unescape(&line.value))))
        .collect();
    let label_for = |line: &ContentLine| {
        line.group
            .as_deref()
            .and_then(|group| group_labels.get(group).cloned())
            .or_else(|| line.type_label())
    };

    let mut contact = RawContact::default();
    let mut emails = Vec::new();
    let mut phones = Vec::new();
    let mut addresses = Vec::new();
    let mut urls = Vec::new();
    let mut social_profiles = Vec::new();
    let mut instant_messages = Vec::new();
    let mut relations = Vec::new();
    let mut formatted_name = None;

    for line in lines {
        match line.name.as_str() {
            "N" => {
                let parts = components(&line.value);
                set_once(&mut contact.last_name, text_attr_opt(parts.first()));
                set_once(&mut contact.first_name, text_attr_opt(parts.get(1)));
                set_once(&mut contact.middle_name, text_attr_opt(parts.get(2)));
            }
            "FN" => formatted_name = Some(unescape(&line.value)),
            "NICKNAME" => set_once(&mut contact.nickname, text_attr(&line.value)),
            "ORG" => {
                let parts = components(&line.value);
                set_once(&mut contact.organization, text_attr_opt(parts.first()));
                set_once(&mut contact.department, text_attr_opt(parts.get(1)));
            }
            "TITLE" => set_once(&mut contact.job_title, text_attr(&line.value)),
            "NOTE" => set_once(&mut contact.note, text_attr(&line.value)),
            "UID" => set_once(&mut contact.identifier, text_attr(&line.value)),
            "BDAY" => {
                let raw = unescape(&line.value);
                let parsed = parse_birthday(&raw)
                    .map(Attr::Present)
                    .unwrap_or_else(|| Attr::Unreadable(format!("invalid BDAY '{raw}'")));
                set_once(&mut contact.birthday, parsed);
            }
            "REV" => {
                let raw = unescape(&line.value);
                let parsed = parse_timestamp(&raw)
                    .map(Attr::Present)
                    .unwrap_or_else(|| Attr::Unreadable(format!("invalid REV '{raw}'")));
                set_once(&mut contact.modified, parsed);
            }
            "X-ABCREATED" | "CREATED" => {
                let raw = unescape(&line.value);
                let parsed = parse_timestamp(&raw)
                    .map(Attr::Present)
                    .unwrap_or_else(|| Attr::Unreadable(format!("invalid creation date '{raw}'")));
                set_once(&mut contact.created, parsed);
            }
            "EMAIL" => emails.push(labeled(label_for(line), unescape(&line.value))),
            "TEL" => {
                let value = unescape(&line.value);
                let value = value.strip_prefix("tel:").unwrap_or(&value).to_string();
                phones.push(labeled(label_for(line), value));
            }
            "URL" => urls.push(labeled(label_for(line), unescape(&line.value))),
            "ADR" => {
                let parts = components(&line.value);
                addresses.push(labeled(
                    label_for(line),
                    PostalAddress {
                        street: non_empty(parts.get(2)),
                        city: non_empty(parts.get(3)),
                        state: non_empty(parts.get(4)),
                        postal_code: non_empty(parts.get(5)),
                        country: non_empty(parts.get(6)),
                    },
                ));
            }
            "X-SOCIALPROFILE" => social_profiles.push(SocialProfile {
                service: line.type_label().unwrap_or_default(),
                username: line.param("X-USER").unwrap_or_default().to_string(),
                url: Some(unescape(&line.value)).filter(|url| !url.trim().is_empty()),
            }),
            "IMPP" => instant_messages.push(labeled(label_for(line), impp_handle(line))),
            "X-ABRELATEDNAMES" | "RELATED" => {
                relations.push(labeled(label_for(line), unescape(&line.value)));
            }
            _ => {}
        }
    }

    // Cards that only carry FN still get a name in the export.
    if !contact.first_name.is_present() && !contact.last_name.is_present() {
        if let Some(name) = formatted_name.filter(|name| !name.trim().is_empty()) {
            contact.first_name = Attr::Present(name);
        }
    }

    contact.emails = into_attr(emails);
    contact.phones = into_attr(phones);
    contact.addresses = into_attr(addresses);
    contact.urls = into_attr(urls);
    contact.social_profiles = into_attr(social_profiles);
    contact.instant_messages = into_attr(instant_messages);
    contact.relations = into_attr(relations);
    contact
}

fn text_attr_opt(value: Option<&String>) -> Attr<String> {
    match non_empty(value) {
        Some(value) => Attr::Present(value),
        None => Attr::Missing,
    }
}

fn labeled<T>(label: Option<String>, value: T) -> Labeled<T> {
    Labeled { label, value }
}

/// `IMPP;X-SERVICE-TYPE=Skype:skype:ada.l` → service `Skype`, user `ada.l`.
fn impp_handle(line: &ContentLine) -> InstantMessage {
    let value = unescape(&line.value);
    let (scheme, username) = match value.split_once(':') {
        Some((scheme, username)) => (scheme.to_string(), username.to_string()),
        None => (String::new(), value),
    };
    let service = line
        .param("X-SERVICE-TYPE")
        .map(str::to_string)
        .unwrap_or(scheme);
    InstantMessage { service, username }
}
