use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Customer contact data that must never reach the logs in clear text.
///
/// `Debug` and `Display` print a redacted form; serialization writes the real
/// value because the order record and the outbound notification need it.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Masked<T>(pub T);

impl<T> Masked<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    pub fn expose(&self) -> &T {
        &self.0
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> From<T> for Masked<T> {
    fn from(value: T) -> Self {
        Self(value)
    }
}

impl Masked<String> {
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Keeps the first character and, for e-mail addresses, the domain so
    /// operators can still tell two customers apart in a log line.
    pub fn redacted(&self) -> String {
        let value = self.0.trim();
        let first = match value.chars().next() {
            Some(c) => c,
            None => return String::new(),
        };
        match value.split_once('@') {
            Some((_, domain)) => format!("{}***@{}", first, domain),
            None => format!("{}***", first),
        }
    }
}

impl fmt::Debug for Masked<String> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.redacted())
    }
}

impl fmt::Display for Masked<String> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}
