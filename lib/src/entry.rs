//! Batch entries and their per-run state machine.
//!
//! An entry is one recipient's unit of work. Its status only moves forward
//! during a run (`pending -> sending -> success | error`) and goes back to
//! `pending` only through an explicit reset or retry.

use chrono::{DateTime, Utc};

pub type EntryId = u64;

#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Deserialize,
    Serialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Status {
    #[default]
    Pending,
    Sending,
    Success,
    Error,
}

/// Recipient-facing part of an entry, as seen by the send boundary.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub email: String,
    pub image_link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: EntryId,
    pub email: String,
    pub image_link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default)]
    pub status: Status,
    /// Only set while `status` is `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Only set while `status` is `success`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,

    /// UI selection flag, ignored by dispatch.
    #[serde(default)]
    pub selected: bool,
}

impl Entry {
    pub fn new(
        id: EntryId,
        email: impl Into<String>,
        image_link: impl Into<String>,
        name: Option<String>,
    ) -> Self {
        Self {
            id,
            email: email.into(),
            image_link: image_link.into(),
            name,
            status: Status::Pending,
            error_message: None,
            sent_at: None,
            selected: false,
        }
    }

    pub fn recipient(&self) -> Recipient {
        Recipient {
            email: self.email.clone(),
            image_link: self.image_link.clone(),
            name: self.name.clone(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == Status::Pending
    }

    pub fn mark_sending(&mut self) {
        self.status = Status::Sending;
        self.error_message = None;
        self.sent_at = None;
    }

    pub fn mark_success(&mut self, at: DateTime<Utc>) {
        self.status = Status::Success;
        self.error_message = None;
        self.sent_at = Some(at);
    }

    pub fn mark_error(&mut self, message: impl Into<String>) {
        self.status = Status::Error;
        self.error_message = Some(message.into());
        self.sent_at = None;
    }

    /// Puts the entry back in the queue.
    pub fn reset(&mut self) {
        self.status = Status::Pending;
        self.error_message = None;
        self.sent_at = None;
    }
}

/// Edits applied to an existing entry. Unset fields are left alone.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EntryUpdate {
    pub email: Option<String>,
    pub image_link: Option<String>,
    pub name: Option<String>,
    pub selected: Option<bool>,
}

impl EntryUpdate {
    pub fn apply(self, entry: &mut Entry) {
        if let Some(email) = self.email {
            entry.email = email.trim().to_string();
        }
        if let Some(image_link) = self.image_link {
            entry.image_link = image_link.trim().to_string();
        }
        if let Some(name) = self.name {
            let name = name.trim();
            entry.name = (!name.is_empty()).then(|| name.to_string());
        }
        if let Some(selected) = self.selected {
            entry.selected = selected;
        }
    }
}

/// Per-status totals over a set of entries.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Counts {
    pub total: usize,
    pub pending: usize,
    pub sending: usize,
    pub success: usize,
    pub error: usize,
}

impl Counts {
    pub fn of(entries: &[Entry]) -> Self {
        let mut counts = Counts {
            total: entries.len(),
            ..Default::default()
        };
        for entry in entries {
            match entry.status {
                Status::Pending => counts.pending += 1,
                Status::Sending => counts.sending += 1,
                Status::Success => counts.success += 1,
                Status::Error => counts.error += 1,
            }
        }
        counts
    }

    pub fn completed(&self) -> usize {
        self.success + self.error
    }

    /// Share of completed entries, in percent.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 0.;
        }
        self.completed() as f64 * 100. / self.total as f64
    }

    pub fn is_consistent(&self) -> bool {
        self.pending + self.sending + self.success + self.error == self.total && self.sending <= 1
    }
}

/// Next free id: one past the current maximum.
pub fn next_id(entries: &[Entry]) -> EntryId {
    entries.iter().map(|e| e.id).max().map_or(1, |max| max + 1)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        assert_eq!(Status::Sending.to_string(), "sending");
        assert_eq!(Status::from_str("Error").unwrap(), Status::Error);
        assert_eq!(
            serde_json::to_string(&Status::Success).unwrap(),
            "\"success\""
        );
    }

    #[test]
    fn transitions_keep_fields_exclusive() {
        let mut entry = Entry::new(1, "a@x.com", "http://i", None);
        entry.mark_sending();
        entry.mark_error("bad address");
        assert_eq!(entry.error_message.as_deref(), Some("bad address"));
        assert!(entry.sent_at.is_none());

        entry.reset();
        assert!(entry.is_pending());
        assert!(entry.error_message.is_none());

        entry.mark_sending();
        entry.mark_success(Utc::now());
        assert!(entry.sent_at.is_some());
        assert!(entry.error_message.is_none());
    }

    #[test]
    fn counts_and_percent() {
        let mut entries = vec![
            Entry::new(1, "a@x.com", "http://i", None),
            Entry::new(2, "b@x.com", "http://i", None),
            Entry::new(3, "c@x.com", "http://i", None),
            Entry::new(4, "d@x.com", "http://i", None),
        ];
        entries[0].mark_success(Utc::now());
        entries[1].mark_error("nope");
        entries[2].mark_sending();

        let counts = Counts::of(&entries);
        assert_eq!(counts.success, 1);
        assert_eq!(counts.error, 1);
        assert_eq!(counts.sending, 1);
        assert_eq!(counts.pending, 1);
        assert!(counts.is_consistent());
        assert_eq!(counts.percent(), 50.);
        assert_eq!(Counts::default().percent(), 0.);
    }

    #[test]
    fn next_id_follows_maximum() {
        assert_eq!(next_id(&[]), 1);
        let entries = vec![
            Entry::new(7, "a@x.com", "http://i", None),
            Entry::new(3, "b@x.com", "http://i", None),
        ];
        assert_eq!(next_id(&entries), 8);
    }

    #[test]
    fn update_clears_blank_name() {
        let mut entry = Entry::new(1, "a@x.com", "http://i", Some("Ann".into()));
        EntryUpdate {
            name: Some("  ".into()),
            selected: Some(true),
            ..Default::default()
        }
        .apply(&mut entry);
        assert!(entry.name.is_none());
        assert!(entry.selected);
    }

    #[test]
    fn update_trims_like_a_new_entry() {
        let mut entry = Entry::new(1, "a@x.com", "http://i", None);
        EntryUpdate {
            email: Some(" b@x.com ".into()),
            image_link: Some("\thttp://img/b.png ".into()),
            name: Some(" Bee ".into()),
            ..Default::default()
        }
        .apply(&mut entry);
        assert_eq!(entry.email, "b@x.com");
        assert_eq!(entry.image_link, "http://img/b.png");
        assert_eq!(entry.name.as_deref(), Some("Bee"));
    }
}
