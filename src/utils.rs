use std::time::{SystemTime, UNIX_EPOCH};

pub fn get_current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Start of the fixed window containing `now`.
pub fn window_start(now: u64, window_seconds: u64) -> u64 {
    now - (now % window_seconds)
}

pub fn format_counter_key(category: &str, client: &str, window_seconds: u64, start: u64) -> String {
    format!("rate:{}:{}:{}:{}", category, client, window_seconds, start)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_start() {
        assert_eq!(window_start(125, 60), 120);
        assert_eq!(window_start(120, 60), 120);
        assert_eq!(window_start(119, 60), 60);
        assert_eq!(window_start(7300, 3600), 7200);
    }

    #[test]
    fn test_format_counter_key() {
        assert_eq!(
            format_counter_key("login", "203.0.113.5", 60, 120),
            "rate:login:203.0.113.5:60:120"
        );
    }
}
