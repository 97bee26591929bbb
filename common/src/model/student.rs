use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Column titles shared by every textual rendition of a student row.
pub const CANONICAL_HEADER: [&str; 6] = [
    "id",
    "firstName",
    "lastName",
    "dateOfBirth",
    "class",
    "score",
];

/// Closed set of class labels a student can belong to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StudentClass {
    Class1,
    Class2,
    Class3,
    Class4,
    Class5,
}

impl StudentClass {
    pub const ALL: [StudentClass; 5] = [
        StudentClass::Class1,
        StudentClass::Class2,
        StudentClass::Class3,
        StudentClass::Class4,
        StudentClass::Class5,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StudentClass::Class1 => "Class1",
            StudentClass::Class2 => "Class2",
            StudentClass::Class3 => "Class3",
            StudentClass::Class4 => "Class4",
            StudentClass::Class5 => "Class5",
        }
    }
}

impl fmt::Display for StudentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown student class '{0}'")]
pub struct ParseClassError(pub String);

impl FromStr for StudentClass {
    type Err = ParseClassError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StudentClass::ALL
            .into_iter()
            .find(|class| class.as_str() == s)
            .ok_or_else(|| ParseClassError(s.to_string()))
    }
}

/// A fully typed student row, as stored by the bulk loader.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
    pub student_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub class: StudentClass,
    pub score: f64,
}
