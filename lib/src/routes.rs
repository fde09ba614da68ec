pub const ENTRIES: &str = "/entries";
pub const ENTRY: &str = "/entries/:id";
pub const ENTRIES_IMPORT: &str = "/entries/import";
pub const ENTRIES_EXPORT: &str = "/entries/export";

pub const TEMPLATE: &str = "/template";
pub const SETTINGS: &str = "/settings";

pub const SEND: &str = "/send";
pub const RETRY: &str = "/retry";
pub const RETRY_ENTRY: &str = "/retry/:id";
pub const CANCEL: &str = "/cancel";
pub const PROGRESS: &str = "/progress";
pub const HISTORY: &str = "/history";

pub const BATCHES: &str = "/batches";
pub const BATCH: &str = "/batches/:id";
pub const BATCH_LOAD: &str = "/batches/:id/load";
