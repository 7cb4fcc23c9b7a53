use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "userrole", rename_all = "lowercase")]
pub(crate) enum UserRole {
    Admin,
    Student,
}

/// One of the four choices attached to every question. Stored as a Postgres
/// enum so the database rejects anything outside A-D as well.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "answeroption")]
pub(crate) enum AnswerOption {
    A,
    B,
    C,
    D,
}

impl AnswerOption {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
        }
    }
}

impl fmt::Display for AnswerOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct InvalidOption(pub(crate) String);

impl FromStr for AnswerOption {
    type Err = InvalidOption;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "A" => Ok(Self::A),
            "B" => Ok(Self::B),
            "C" => Ok(Self::C),
            "D" => Ok(Self::D),
            other => Err(InvalidOption(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answer_option_parses_the_four_letters() {
        for (raw, expected) in [
            ("A", AnswerOption::A),
            ("B", AnswerOption::B),
            ("C", AnswerOption::C),
            ("D", AnswerOption::D),
        ] {
            assert_eq!(raw.parse::<AnswerOption>().unwrap(), expected);
            assert_eq!(expected.as_str(), raw);
        }
    }

    #[test]
    fn answer_option_rejects_everything_else() {
        assert!("E".parse::<AnswerOption>().is_err());
        assert!("a".parse::<AnswerOption>().is_err());
        assert!("".parse::<AnswerOption>().is_err());
        assert!("AB".parse::<AnswerOption>().is_err());
    }
}
