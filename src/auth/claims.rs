use serde::{Deserialize, Serialize};

/// JWT payload used for authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub iat: i64, // issued at (unix timestamp)
    #[serde(rename = "exp")]
    pub expires_at: i64, // unix timestamp
}
