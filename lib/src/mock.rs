//! Module tasked with generating mock data to populate the application.

use crate::email::Template;
use crate::entry::Entry;
use crate::store::Store;
use crate::Result;

/// Seeds an empty store with a handful of sample entries and a template.
/// Stores that already hold entries or a template are left alone.
pub fn generate(store: &Store) -> Result<()> {
    if store.entries()?.is_empty() {
        let entries = entries();
        store.set_entries(&entries)?;
        tracing::info!(count = entries.len(), "seeded mock entries");
    }

    if !store.has_template()? {
        store.set_template(&template())?;
    }

    Ok(())
}

pub fn entries() -> Vec<Entry> {
    vec![
        Entry::new(
            1,
            "ann@example.com",
            "https://picsum.photos/id/10/600/400",
            Some("Ann".to_string()),
        ),
        Entry::new(
            2,
            "bob@example.com",
            "https://picsum.photos/id/20/600/400",
            None,
        ),
        Entry::new(
            3,
            "carol@example.com",
            "https://picsum.photos/id/30/600/400",
            Some("Carol".to_string()),
        ),
    ]
}

pub fn template() -> Template {
    Template::new(
        "A picture for you, {{name}}",
        "<p>Hi {{name}},</p>\
         <p>this one was picked just for {{email}}:</p>\
         <p><img src=\"{{imageLink}}\" alt=\"\"></p>",
    )
}

#[cfg(test)]
mod tests {
    use crate::Database;

    use super::*;

    #[test]
    fn seeds_only_empty_store() {
        let store = Store::new(Database::temporary().unwrap());
        store
            .set_entries(&[Entry::new(9, "z@x.com", "http://i", None)])
            .unwrap();

        generate(&store).unwrap();
        assert_eq!(store.entries().unwrap().len(), 1);
        assert_eq!(store.template().unwrap(), template());
    }
}
