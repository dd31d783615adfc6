//! JWT claims and principal roles.

use serde::{Deserialize, Serialize};

/// Principal role.
///
/// The set is closed: a token carrying any other role string fails to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Administrative staff.
    Admin,
    /// Enrolled student.
    Student,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Student => write!(f, "student"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "student" => Ok(Role::Student),
            _ => Err(format!("unknown role: {}", s)),
        }
    }
}

/// JWT claims structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (principal ID).
    pub sub: String,

    /// Role the token was issued for.
    pub role: Role,

    /// Expiration time (as Unix timestamp).
    pub exp: i64,

    /// Issued at (as Unix timestamp).
    #[serde(default)]
    pub iat: Option<i64>,

    /// Issuer.
    #[serde(default)]
    pub iss: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_display() {
        assert_eq!(Role::Admin.to_string(), "admin");
        assert_eq!(Role::Student.to_string(), "student");
    }

    #[test]
    fn test_role_from_str() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("Student".parse::<Role>().unwrap(), Role::Student);
        assert!("teacher".parse::<Role>().is_err());
    }

    #[test]
    fn test_claims_reject_unknown_role() {
        let raw = r#"{"sub":"a1","role":"superuser","exp":0}"#;
        assert!(serde_json::from_str::<Claims>(raw).is_err());

        let raw = r#"{"sub":"a1","role":"admin","exp":0}"#;
        let claims: Claims = serde_json::from_str(raw).unwrap();
        assert_eq!(claims.role, Role::Admin);
        assert!(claims.iss.is_none());
    }
}
