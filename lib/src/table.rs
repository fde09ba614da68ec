//! Delimited table import and export of batch entries.
//!
//! Import is header driven. Columns are picked by case-insensitive substring
//! match on the header: `email` for the address, `image`, `link` or `url` for
//! the image link and `name` for the optional display name. Rows missing the
//! address or the image link are skipped.

use std::io;

use crate::entry::{Entry, EntryId};
use crate::{ErrorKind, Result};

pub const EXPORT_HEADER: [&str; 4] = ["Email", "Image Link", "Name", "Status"];

const IMAGE_MARKERS: [&str; 3] = ["image", "link", "url"];

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct Columns {
    email: usize,
    image_link: usize,
    name: Option<usize>,
}

impl Columns {
    fn find(headers: &csv::StringRecord) -> Result<Self> {
        let headers: Vec<String> = headers.iter().map(|h| h.to_lowercase()).collect();

        let email = headers
            .iter()
            .position(|h| h.contains("email"))
            .ok_or_else(|| ErrorKind::BadInput("no email column in table header".to_string()))?;
        let image_link = headers
            .iter()
            .enumerate()
            .position(|(i, h)| i != email && IMAGE_MARKERS.iter().any(|m| h.contains(m)))
            .ok_or_else(|| {
                ErrorKind::BadInput("no image link column in table header".to_string())
            })?;
        let name = headers
            .iter()
            .enumerate()
            .position(|(i, h)| i != email && i != image_link && h.contains("name"));

        Ok(Self {
            email,
            image_link,
            name,
        })
    }
}

/// Reads entries from a comma separated table. The first kept row gets id
/// `first_id`, the following ones count up from there.
pub fn import<R: io::Read>(reader: R, first_id: EntryId) -> Result<Vec<Entry>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let columns = Columns::find(reader.headers()?)?;

    let mut entries = Vec::new();
    let mut skipped = 0;
    for record in reader.records() {
        let record = record?;
        let email = record.get(columns.email).unwrap_or_default();
        let image_link = record.get(columns.image_link).unwrap_or_default();
        if email.is_empty() || image_link.is_empty() {
            skipped += 1;
            continue;
        }
        let name = columns
            .name
            .and_then(|i| record.get(i))
            .filter(|n| !n.is_empty())
            .map(str::to_string);

        entries.push(Entry::new(
            first_id + entries.len() as EntryId,
            email,
            image_link,
            name,
        ));
    }

    if skipped > 0 {
        log::debug!("skipped {skipped} incomplete rows on import");
    }

    Ok(entries)
}

/// Writes entries in array order.
pub fn export<W: io::Write>(entries: &[Entry], writer: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    writer.write_record(EXPORT_HEADER)?;
    for entry in entries {
        writer.write_record([
            entry.email.as_str(),
            entry.image_link.as_str(),
            entry.name.as_deref().unwrap_or_default(),
            entry.status.to_string().as_str(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}
