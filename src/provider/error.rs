use std::error;
use std::fmt;
use std::io;

/// Failures surfaced to the embedder. Calendar parsing itself never fails;
/// these cover the shell around the parser: fetching sources, loading
/// configuration, and the two value grammars with a hard reject.
#[derive(Debug)]
pub enum Error {
    /// A calendar source could not be fetched.
    Fetch { url: String, source: io::Error },
    /// The configuration file could not be read or parsed.
    Config(String),
    /// An RRULE value carried no usable frequency.
    RecurRule(String),
    /// A POSIX-TZ string did not parse.
    Timezone(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Fetch { url, source } => write!(f, "could not fetch '{}': {}", url, source),
            Error::Config(msg) => write!(f, "invalid configuration: {}", msg),
            Error::RecurRule(msg) => write!(f, "invalid recurrence rule: {}", msg),
            Error::Timezone(tz) => write!(f, "unrecognized timezone '{}'", tz),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Fetch { source, .. } => Some(source),
            _ => None,
        }
    }
}
