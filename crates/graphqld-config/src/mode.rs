//! How the binary takes requests.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Request intake mode.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum RequestMode {
    /// Read one request document, answer it, and exit.
    #[default]
    Single,
    /// Read one request per line until end of input, rescanning the
    /// document root before each request when it has changed.
    Stream,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::single("single", RequestMode::Single)]
    #[case::stream("STREAM", RequestMode::Stream)]
    fn parses_mode_names(#[case] input: &str, #[case] expected: RequestMode) {
        assert_eq!(RequestMode::from_str(input).expect("known mode"), expected);
    }

    #[test]
    fn single_is_the_default() {
        assert_eq!(RequestMode::default(), RequestMode::Single);
        assert_eq!(RequestMode::Stream.to_string(), "stream");
    }
}
