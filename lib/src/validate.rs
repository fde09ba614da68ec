//! Pre-flight checks run over the whole batch before anything is sent.

use validator::ValidateEmail;

use crate::entry::{Entry, EntryId};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize, strum::Display)]
pub enum Violation {
    #[strum(to_string = "Email is required")]
    EmailRequired,
    #[strum(to_string = "Image link is required")]
    ImageLinkRequired,
    #[strum(to_string = "Invalid email format")]
    InvalidEmail,
    #[strum(to_string = "Image link must start with http")]
    InvalidImageLink,
}

/// Violations found per entry, kept in batch order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Report {
    pub violations: Vec<(EntryId, Vec<Violation>)>,
}

impl Report {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    /// First violating entry in batch order.
    pub fn first_violator(&self) -> Option<EntryId> {
        self.violations.first().map(|(id, _)| *id)
    }

    pub fn get(&self, id: EntryId) -> Option<&[Violation]> {
        self.violations
            .iter()
            .find(|(entry, _)| *entry == id)
            .map(|(_, v)| v.as_slice())
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Checks a single entry. Shape checks only apply to fields that are present.
pub fn check(entry: &Entry) -> Vec<Violation> {
    let mut out = Vec::new();

    let email = entry.email.trim();
    let image_link = entry.image_link.trim();

    if email.is_empty() {
        out.push(Violation::EmailRequired);
    }
    if image_link.is_empty() {
        out.push(Violation::ImageLinkRequired);
    }
    if !email.is_empty() && !is_email(email) {
        out.push(Violation::InvalidEmail);
    }
    if !image_link.is_empty() && !image_link.starts_with("http") {
        out.push(Violation::InvalidImageLink);
    }

    out
}

/// `local@domain.tld`: a valid address whose domain has a dot-separated
/// suffix.
pub fn is_email(address: &str) -> bool {
    if !address.validate_email() {
        return false;
    }
    match address.rsplit_once('@') {
        Some((_, domain)) => domain
            .rsplit_once('.')
            .map_or(false, |(host, tld)| !host.is_empty() && !tld.is_empty()),
        None => false,
    }
}

/// Validates every entry without touching them.
pub fn validate(entries: &[Entry]) -> Report {
    let violations = entries
        .iter()
        .filter_map(|entry| {
            let v = check(entry);
            (!v.is_empty()).then_some((entry.id, v))
        })
        .collect();
    Report { violations }
}

/// Validates the batch and flags every violating entry as failed, with the
/// violation messages joined into its error message.
pub fn validate_batch(entries: &mut [Entry]) -> Report {
    let report = validate(entries);
    for (id, violations) in &report.violations {
        if let Some(entry) = entries.iter_mut().find(|e| e.id == *id) {
            entry.mark_error(join(violations));
        }
    }
    report
}

pub fn join(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
