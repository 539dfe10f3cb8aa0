//! 单聊会话键相关工具函数的单元测试

#[cfg(test)]
mod tests {
    use crate::utils::{direct_pair_key, micros_to_datetime, parse_direct_pair_key};

    #[test]
    fn test_direct_pair_key_is_order_independent() {
        assert_eq!(direct_pair_key("u1", "u2"), "u1_u2");
        assert_eq!(direct_pair_key("u2", "u1"), "u1_u2");
    }

    #[test]
    fn test_direct_pair_key_escapes_separator() {
        // 未转义时 ("a_b", "c") 与 ("a", "b_c") 会得到相同的键
        let left = direct_pair_key("a_b", "c");
        let right = direct_pair_key("a", "b_c");
        assert_ne!(left, right);
        assert_eq!(left, "a%5Fb_c");
        assert_eq!(direct_pair_key("50%", "x"), "50%25_x");
    }

    #[test]
    fn test_parse_direct_pair_key_round_trip() {
        let key = direct_pair_key("user_b", "user%a");
        assert_eq!(
            parse_direct_pair_key(&key),
            Some(("user%a".to_string(), "user_b".to_string()))
        );
    }

    #[test]
    fn test_parse_rejects_legacy_ids() {
        assert_eq!(parse_direct_pair_key("3f1c9a0e-7b1d-4a53-9d1e-1f1f1f1f1f1f"), None);
        assert_eq!(parse_direct_pair_key("a_b_c"), None);
        assert_eq!(parse_direct_pair_key("z_a"), None);
        assert_eq!(parse_direct_pair_key("_a"), None);
        assert_eq!(parse_direct_pair_key("a%zz_b"), None);
    }

    #[test]
    fn test_time_conversions() {
        let dt = micros_to_datetime(1_700_000_000_123_456).unwrap();
        assert_eq!(dt.timestamp_micros(), 1_700_000_000_123_456);
    }
}
