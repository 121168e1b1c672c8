use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Stable customer identity. For WhatsApp traffic this is the digits of the
/// sender address (`whatsapp:+52 1 55...` becomes `52155...`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CustomerId(pub String);

impl CustomerId {
    /// Derives the identity from a raw channel address by keeping digits only.
    pub fn from_channel(raw: &str) -> Self {
        Self(raw.chars().filter(char::is_ascii_digit).collect())
    }
}

impl std::fmt::Display for CustomerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub whatsapp: Option<String>,
    pub birth_date: Option<NaiveDate>,
}

impl Customer {
    pub fn display_name(&self) -> String {
        let name = format!("{} {}", self.first_name, self.last_name);
        let trimmed = name.trim();
        if trimmed.is_empty() {
            "Cliente sin nombre".to_string()
        } else {
            trimmed.to_string()
        }
    }
}
