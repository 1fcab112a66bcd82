use chrono::{DateTime, FixedOffset};

/// Asia/Shanghai has been UTC+8 without DST since 1991
const SHANGHAI_OFFSET_SECS: i32 = 8 * 3600;

/// Render a Unix timestamp (seconds) as `YYYY-MM-DD HH:MM:SS` in Asia/Shanghai time.
pub fn timestamp_format(secs: i64) -> String {
    let offset = FixedOffset::east_opt(SHANGHAI_OFFSET_SECS);
    match (DateTime::from_timestamp(secs, 0), offset) {
        (Some(t), Some(offset)) => t
            .with_timezone(&offset)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        _ => secs.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch() {
        assert_eq!(timestamp_format(0), "1970-01-01 08:00:00");
    }

    #[test]
    fn test_crosses_midnight() {
        // 2023-03-28 00:00:00 UTC
        assert_eq!(timestamp_format(1679961600), "2023-03-28 08:00:00");
        // 2023-03-27 16:00:00 UTC is already the 28th in Shanghai
        assert_eq!(timestamp_format(1679932800), "2023-03-28 00:00:00");
    }

    #[test]
    fn test_out_of_range_falls_back() {
        assert_eq!(timestamp_format(i64::MAX), i64::MAX.to_string());
    }
}
