//! Rendering of sequence values into human-readable identifiers.

use crate::contracts::FormatConfig;

/// Renders `sequence` as `[prefix]<sep>[year]<sep><padded number>`.
///
/// The custom prefix is used only when `use_custom_prefix` is set, otherwise
/// `default_prefix`. The number is zero-padded to `digit_count` but never
/// truncated. Empty segments are dropped together with their separator.
/// `year` is the year of the scope the sequence was reserved in.
pub fn format_identifier(
    config: &FormatConfig,
    default_prefix: &str,
    sequence: u64,
    year: i32,
) -> String {
    let prefix = if config.use_custom_prefix {
        config.prefix.as_str()
    } else {
        default_prefix
    };

    let year = config.include_year.then(|| year.to_string());
    let number = format!("{:0width$}", sequence, width = config.digit_count);

    let segments = [Some(prefix), year.as_deref(), Some(number.as_str())];
    let mut output = String::with_capacity(prefix.len() + number.len() + 6);
    for segment in segments.into_iter().flatten().filter(|s| !s.is_empty()) {
        if !output.is_empty() {
            output.push_str(&config.separator);
        }
        output.push_str(segment);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mr_config() -> FormatConfig {
        FormatConfig {
            prefix: "MR".into(),
            use_custom_prefix: false,
            include_year: true,
            digit_count: 4,
            separator: "-".into(),
        }
    }

    #[test]
    fn renders_prefix_year_and_padded_number() {
        assert_eq!(format_identifier(&mr_config(), "MR", 1, 2024), "MR-2024-0001");
    }

    #[test]
    fn wide_values_are_not_truncated() {
        let rendered = format_identifier(&mr_config(), "MR", 12345, 2024);
        assert_eq!(rendered, "MR-2024-12345");

        let rendered = format_identifier(&mr_config(), "MR", u64::MAX, 2024);
        assert!(rendered.ends_with(&u64::MAX.to_string()));
    }

    #[test]
    fn custom_prefix_applies_only_when_enabled() {
        let mut config = mr_config();
        config.prefix = "HOSP".into();
        assert_eq!(format_identifier(&config, "MR", 7, 2024), "MR-2024-0007");

        config.use_custom_prefix = true;
        assert_eq!(format_identifier(&config, "MR", 7, 2024), "HOSP-2024-0007");
    }

    #[test]
    fn year_segment_is_optional() {
        let config = FormatConfig {
            include_year: false,
            ..mr_config()
        };
        assert_eq!(format_identifier(&config, "TKN", 42, 2024), "TKN-0042");
    }

    #[test]
    fn empty_prefix_leaves_no_dangling_separator() {
        let config = FormatConfig {
            prefix: String::new(),
            use_custom_prefix: true,
            ..mr_config()
        };
        assert_eq!(format_identifier(&config, "MR", 3, 2024), "2024-0003");

        let config = FormatConfig {
            include_year: false,
            ..config
        };
        assert_eq!(format_identifier(&config, "MR", 3, 2024), "0003");
    }

    #[test]
    fn separator_and_width_follow_config() {
        let config = FormatConfig {
            separator: "/".into(),
            digit_count: 6,
            ..mr_config()
        };
        assert_eq!(format_identifier(&config, "OPD", 98, 2025), "OPD/2025/000098");

        let config = FormatConfig {
            digit_count: 1,
            ..mr_config()
        };
        assert_eq!(format_identifier(&config, "MR", 0, 2025), "MR-2025-0");
    }
}
