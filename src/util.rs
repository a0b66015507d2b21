use chrono::Local;

use crate::storage::schema::parse_timestamp;

const SMTP_PASSWORD: &str = "LWQMS_SMTP_PASSWORD";

pub fn get_smtp_password() -> Option<String> {
    let password_from_env = std::env::var(SMTP_PASSWORD);
    password_from_env.ok().filter(|password| !password.is_empty())
}

const PRETTY_FORMAT: &str = "%b %d, %Y %I:%M:%S %p";

/// Render a stored timestamp for humans, e.g. `Apr 01, 2025 02:30:00 PM`
/// in local time. Unparsable input is returned as is.
pub fn format_pretty_timestamp(raw: &str) -> String {
    if raw.trim().is_empty() {
        return "N/A".to_string();
    }

    parse_timestamp(raw)
        .map(|timestamp| timestamp.with_timezone(&Local).format(PRETTY_FORMAT).to_string())
        .unwrap_or_else(|_| raw.to_string())
}
