//! Environment variable helpers for `from_env` configuration constructors.

use std::str::FromStr;
use std::time::Duration;

use crate::error::CoreError;

/// Read `key` and parse it, falling back to `default` when unset.
///
/// A set but unparsable value is a validation error rather than a silent
/// fallback, so misconfiguration fails at startup.
pub fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T, CoreError> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().parse().map_err(|_| {
            CoreError::Validation(format!("{key} has an invalid value '{raw}'"))
        }),
        _ => Ok(default),
    }
}

/// Read a millisecond duration from `key`.
pub fn env_duration_ms(key: &str, default: Duration) -> Result<Duration, CoreError> {
    env_parse(key, default.as_millis() as u64).map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_key_uses_default() {
        let value: u32 = env_parse("XYPLOT_TEST_SURELY_UNSET_KEY", 7).unwrap();
        assert_eq!(value, 7);
        assert_eq!(
            env_duration_ms("XYPLOT_TEST_SURELY_UNSET_KEY", Duration::from_millis(250)).unwrap(),
            Duration::from_millis(250)
        );
    }

    #[test]
    fn set_key_is_parsed_and_garbage_rejected() {
        std::env::set_var("XYPLOT_TEST_CONFIG_GOOD", " 12 ");
        std::env::set_var("XYPLOT_TEST_CONFIG_BAD", "twelve");
        assert_eq!(env_parse::<u64>("XYPLOT_TEST_CONFIG_GOOD", 1).unwrap(), 12);
        assert!(env_parse::<u64>("XYPLOT_TEST_CONFIG_BAD", 1).is_err());
        assert_eq!(
            env_duration_ms("XYPLOT_TEST_CONFIG_GOOD", Duration::ZERO).unwrap(),
            Duration::from_millis(12)
        );
    }
}
