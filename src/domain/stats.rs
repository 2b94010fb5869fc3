#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
}

#[derive(Debug, Clone)]
pub struct CommitRecord {
    pub committed_date: Option<String>,
    pub author_id: Option<String>,
    pub additions: u64,
    pub deletions: u64,
}

/// Lines changed by one identity across a single repository's history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LocStats {
    pub additions: u64,
    pub deletions: u64,
    pub commits: u64,
}

impl LocStats {
    /// Counts the commit only when it was authored by `identity`.
    pub fn record(&mut self, commit: &CommitRecord, identity: &Identity) {
        if commit.author_id.as_deref() == Some(identity.id.as_str()) {
            self.additions += commit.additions;
            self.deletions += commit.deletions;
            self.commits += 1;
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    pub additions: u64,
    pub deletions: u64,
}

impl Totals {
    pub fn net(&self) -> i128 {
        i128::from(self.additions) - i128::from(self.deletions)
    }

    pub fn net_label(&self) -> String {
        format_thousands(self.net())
    }

    pub fn additions_label(&self) -> String {
        format!("{}++", format_thousands(self.additions.into()))
    }

    pub fn deletions_label(&self) -> String {
        format!("{}--", format_thousands(self.deletions.into()))
    }

    pub fn summary_label(&self) -> String {
        format!(
            "{} ({}, {})",
            self.net_label(),
            self.additions_label(),
            self.deletions_label()
        )
    }
}

pub fn format_thousands(value: i128) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        grouped.push('-');
    }
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}
