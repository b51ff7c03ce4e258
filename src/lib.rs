pub mod errors;
pub mod logging;
pub mod matrix;
pub mod partition;
pub mod results;
pub mod sampler;

use std::str::FromStr;

use errors::HarnessError;

/// Fetch positional argument `idx` (0 is the program name), naming it in the error.
pub fn required_arg<'a>(
    args: &'a [String],
    idx: usize,
    name: &str,
) -> Result<&'a str, HarnessError> {
    args.get(idx).map(String::as_str).ok_or_else(|| {
        HarnessError::InvalidArgument(format!("missing positional argument <{}>", name))
    })
}

/// Parse positional argument `idx` if it was given.
pub fn optional_arg<T: FromStr>(
    args: &[String],
    idx: usize,
    name: &str,
) -> Result<Option<T>, HarnessError> {
    args.get(idx).map(|raw| parse_arg(raw, name)).transpose()
}

pub fn parse_arg<T: FromStr>(raw: &str, name: &str) -> Result<T, HarnessError> {
    raw.parse().map_err(|_| {
        HarnessError::InvalidArgument(format!("<{}> must be a number, got '{}'", name, raw))
    })
}
