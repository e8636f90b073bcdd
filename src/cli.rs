//! CLI argument handling for checkboottimes
//!
//! The only argument is an optional repetition count.

/// Argument errors
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CliError {
    #[error("Argument should be integer. It represents number of times we want to run emulator. If not provided default value equals 1")]
    InvalidExecutionTimes(String),
}

/// Usage text printed after an invalid argument
pub fn usage() -> String {
    "Usage:\n checkboottimes [executionTimes]\n\ni.e: checkboottimes 5".to_string()
}

/// Parse the optional `executionTimes` positional argument.
///
/// Arguments after the first are ignored.
pub fn parse_execution_times<I, S>(args: I) -> Result<Option<u32>, CliError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    match args.into_iter().next() {
        None => Ok(None),
        Some(arg) => {
            let arg = arg.as_ref();
            arg.trim()
                .parse()
                .map(Some)
                .map_err(|_| CliError::InvalidExecutionTimes(arg.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_argument() {
        assert_eq!(parse_execution_times(Vec::<String>::new()), Ok(None));
    }

    #[test]
    fn test_integer_argument() {
        assert_eq!(parse_execution_times(["5"]), Ok(Some(5)));
        assert_eq!(parse_execution_times(["3", "ignored"]), Ok(Some(3)));
    }

    #[test]
    fn test_invalid_argument() {
        assert_eq!(
            parse_execution_times(["five"]),
            Err(CliError::InvalidExecutionTimes("five".to_string()))
        );
        assert!(parse_execution_times(["-2"]).is_err());
    }

    #[test]
    fn test_usage_mentions_example() {
        assert!(usage().contains("checkboottimes 5"));
    }
}
