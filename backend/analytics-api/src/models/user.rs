use serde::{Deserialize, Serialize};

use crate::middlewares::auth::JwtClaims;

/// Identity of the signed-in user as seen by the analytics layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub uid: String,
    pub email: Option<String>,
    pub email_verified: bool,
}

impl From<&JwtClaims> for CurrentUser {
    fn from(claims: &JwtClaims) -> Self {
        Self {
            uid: claims.sub.clone(),
            email: claims.email.clone(),
            email_verified: claims.email_verified,
        }
    }
}
