use std::fmt;

/// Every column the exporter knows how to fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    FirstName,
    LastName,
    MiddleName,
    Nickname,
    Company,
    JobTitle,
    Department,
    Email1,
    Email2,
    Email3,
    Phone1,
    Phone2,
    Phone3,
    Mobile,
    HomeAddress,
    WorkAddress,
    Birthday,
    Notes,
    Urls,
    SocialProfiles,
    InstantMessages,
    RelatedNames,
    ContactId,
    Created,
    Modified,
}

impl Column {
    pub const STANDARD: [Column; 20] = [
        Column::FirstName,
        Column::LastName,
        Column::MiddleName,
        Column::Nickname,
        Column::Company,
        Column::JobTitle,
        Column::Department,
        Column::Email1,
        Column::Email2,
        Column::Email3,
        Column::Phone1,
        Column::Phone2,
        Column::Phone3,
        Column::Mobile,
        Column::HomeAddress,
        Column::WorkAddress,
        Column::Birthday,
        Column::Notes,
        Column::Urls,
        Column::SocialProfiles,
    ];

    /// Columns appended to [`Column::STANDARD`] by the full-field layout.
    pub const FULL_EXTRA: [Column; 5] = [
        Column::InstantMessages,
        Column::RelatedNames,
        Column::ContactId,
        Column::Created,
        Column::Modified,
    ];

    pub fn header(self) -> &'static str {
        match self {
            Column::FirstName => "First Name",
            Column::LastName => "Last Name",
            Column::MiddleName => "Middle Name",
            Column::Nickname => "Nickname",
            Column::Company => "Company",
            Column::JobTitle => "Job Title",
            Column::Department => "Department",
            Column::Email1 => "Email 1",
            Column::Email2 => "Email 2",
            Column::Email3 => "Email 3",
            Column::Phone1 => "Phone 1",
            Column::Phone2 => "Phone 2",
            Column::Phone3 => "Phone 3",
            Column::Mobile => "Mobile",
            Column::HomeAddress => "Home Address",
            Column::WorkAddress => "Work Address",
            Column::Birthday => "Birthday",
            Column::Notes => "Notes",
            Column::Urls => "URLs",
            Column::SocialProfiles => "Social Profiles",
            Column::InstantMessages => "Instant Messages",
            Column::RelatedNames => "Related Names",
            Column::ContactId => "Contact ID",
            Column::Created => "Created",
            Column::Modified => "Modified",
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header())
    }
}

/// Which fixed header set a run uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColumnLayout {
    #[default]
    Standard,
    Full,
}

/// The ordered header set of a run. Established once, before any row is
/// produced, and shared by every row of the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnHeaders {
    columns: Vec<Column>,
}

impl ColumnHeaders {
    pub fn for_layout(layout: ColumnLayout) -> Self {
        let mut columns = Column::STANDARD.to_vec();
        if layout == ColumnLayout::Full {
            columns.extend(Column::FULL_EXTRA);
        }
        Self { columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn position(&self, column: Column) -> Option<usize> {
        self.columns.iter().position(|candidate| *candidate == column)
    }

    /// Header texts in column order.
    pub fn names(&self) -> Vec<String> {
        self.columns
            .iter()
            .map(|column| column.header().to_string())
            .collect()
    }
}

impl Default for ColumnHeaders {
    fn default() -> Self {
        Self::for_layout(ColumnLayout::Standard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_layout_matches_documented_order() {
        let headers = ColumnHeaders::for_layout(ColumnLayout::Standard);
        assert_eq!(headers.len(), 20);
        assert_eq!(headers.names()[0], "First Name");
        assert_eq!(headers.names()[13], "Mobile");
        assert_eq!(headers.names()[19], "Social Profiles");
    }

    #[test]
    fn full_layout_appends_extra_columns() {
        let headers = ColumnHeaders::for_layout(ColumnLayout::Full);
        assert_eq!(headers.len(), 25);
        assert_eq!(headers.position(Column::ContactId), Some(22));
        assert_eq!(headers.names().last().map(String::as_str), Some("Modified"));
    }
}
