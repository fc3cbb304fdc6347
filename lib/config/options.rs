use std::fmt;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A single `key[=value]` token from a comma-separated device specification.
///
/// The value may be empty: `nat` parses to `{key: "nat", value: ""}` and acts as a flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceOption {
    /// The option key, everything before the first `=`.
    pub key: String,

    /// The option value, everything after the first `=`; empty for flag-style options.
    pub value: String,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Splits each token on the first `=` into a [`DeviceOption`].
///
/// Tokens without an `=` become flag-style options with an empty value; empty tokens are
/// skipped. Parsing cannot fail — invalid combinations are detected by the consuming device
/// codec.
pub fn parse_options<S: AsRef<str>>(tokens: &[S]) -> Vec<DeviceOption> {
    tokens
        .iter()
        .map(AsRef::as_ref)
        .filter(|token| !token.is_empty())
        .map(|token| match token.split_once('=') {
            Some((key, value)) => DeviceOption {
                key: key.to_string(),
                value: value.to_string(),
            },
            None => DeviceOption {
                key: token.to_string(),
                value: String::new(),
            },
        })
        .collect()
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl fmt::Display for DeviceOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.value.is_empty() {
            write!(f, "{}", self.key)
        } else {
            write!(f, "{}={}", self.key, self.value)
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_options_key_value() {
        let opts = parse_options(&["path=/tmp/disk.img", "deviceId=disk0"]);
        assert_eq!(
            opts,
            vec![
                DeviceOption {
                    key: "path".to_string(),
                    value: "/tmp/disk.img".to_string()
                },
                DeviceOption {
                    key: "deviceId".to_string(),
                    value: "disk0".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_parse_options_flag_and_empty() {
        let opts = parse_options(&["nat", "", "mac=00:11:22:33:44:55"]);
        assert_eq!(opts.len(), 2);
        assert_eq!(opts[0].key, "nat");
        assert_eq!(opts[0].value, "");
        assert_eq!(opts[1].key, "mac");
    }

    #[test]
    fn test_parse_options_splits_on_first_equals_only() {
        let opts = parse_options(&["cmdline=console=hvc0"]);
        assert_eq!(opts[0].key, "cmdline");
        assert_eq!(opts[0].value, "console=hvc0");
    }

    #[test]
    fn test_option_display_round_trip() {
        for token in ["nat", "path=/foo/bar", "cmdline=a=b"] {
            let opts = parse_options(&[token]);
            assert_eq!(opts[0].to_string(), token);
        }
    }
}
