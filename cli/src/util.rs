use anyhow::Result;

use mailshot::{BatchController, Config, Entry};

pub fn controller(config: &Config) -> Result<BatchController> {
    Ok(BatchController::from_config(config)?)
}

pub fn print_entries(entries: &[Entry]) {
    if entries.is_empty() {
        println!("No entries.");
        return;
    }
    for entry in entries {
        print_entry(entry);
    }
}

pub fn print_entry(entry: &Entry) {
    let name = entry.name.as_deref().unwrap_or("-");
    print!(
        "#{:<4} {:<8} {:<32} {:<16} {}",
        entry.id,
        entry.status.to_string(),
        entry.email,
        name,
        entry.image_link
    );
    match &entry.error_message {
        Some(message) => println!("  ({message})"),
        None => println!(),
    }
}
