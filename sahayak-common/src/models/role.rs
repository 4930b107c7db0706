//! User roles and role-scoped permissions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::UnknownVariant;

/// Role of an account
///
/// - `Teacher`: classroom teacher submitting SOS requests
/// - `Crp`: cluster resource person supervising a block of schools
/// - `Diet`: district institute staff supervising a district
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Teacher,
    Crp,
    Diet,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Teacher, Role::Crp, Role::Diet];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Teacher => "teacher",
            Role::Crp => "crp",
            Role::Diet => "diet",
        }
    }

    /// CRP and DIET accounts see other teachers' data
    pub fn is_supervisor(&self) -> bool {
        matches!(self, Role::Crp | Role::Diet)
    }

    /// Whether an account with this role may open the dashboard of `target`
    pub fn can_view_dashboard(&self, target: Role) -> bool {
        match target {
            Role::Teacher => true,
            Role::Crp => self.is_supervisor(),
            Role::Diet => *self == Role::Diet,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "teacher" => Ok(Role::Teacher),
            "crp" => Ok(Role::Crp),
            "diet" => Ok(Role::Diet),
            _ => Err(UnknownVariant {
                kind: "role",
                value: s.to_string(),
            }),
        }
    }
}
