use std::num::ParseFloatError;

use thiserror::Error;

/// Failure to turn a boundary input into a `Value`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValueError {
    #[error("Value must be a float or an int, got {input:?}")]
    InvalidNumber {
        input: String,
        #[source]
        source: ParseFloatError,
    },
}

#[test]
fn test_message() {
    let source = "x".parse::<f64>().unwrap_err();
    let err = ValueError::InvalidNumber {
        input: "x".to_string(),
        source,
    };
    assert_eq!(err.to_string(), "Value must be a float or an int, got \"x\"");
    assert!(std::error::Error::source(&err).is_some());
}
