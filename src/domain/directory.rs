use serde::{Deserialize, Serialize};

/// Product metadata owned by the Product service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub barcode: String,
    #[serde(default)]
    pub price: i64,
}

/// User profile owned by the User service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl UserProfile {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.eq_ignore_ascii_case(role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_check_ignores_case() {
        let user = UserProfile {
            id: 1,
            name: "Ana".into(),
            email: "ana@example.com".into(),
            roles: vec!["manager".into()],
        };
        assert!(user.has_role("Manager"));
        assert!(!user.has_role("Keeper"));
    }
}
