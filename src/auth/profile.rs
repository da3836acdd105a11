//! The signed-in user's own account under `/user`.

use serde::{Deserialize, Serialize};

use crate::api::client::ApiClient;
use crate::api::request::Method;
use crate::auth::validate;
use crate::core::errors::{LabError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Profile {
    pub id: Option<i64>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub role: Option<String>,
    pub mfa_enabled: bool,
    pub image: Option<String>,
}

impl Profile {
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

/// Editable subset of [`Profile`]. Unset fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl ProfileUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none()
            && self.last_name.is_none()
            && self.phone_number.is_none()
            && self.image.is_none()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordChange<'a> {
    current_password: &'a str,
    new_password: &'a str,
    confirmation_password: &'a str,
}

pub struct ProfileService {
    client: ApiClient,
}

impl ProfileService {
    #[must_use]
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn profile(&self) -> Result<Profile> {
        self.client.get_json("/user/profile", Vec::new())
    }

    pub fn change_password(&self, current: &str, new: &str, confirm: &str) -> Result<Option<String>> {
        validate::required("currentPassword", current)?;
        validate::password("newPassword", new)?;
        validate::confirmation(new, confirm)?;
        let body = PasswordChange {
            current_password: current,
            new_password: new,
            confirmation_password: confirm,
        };
        let request = self
            .client
            .request(Method::Post, "/user/change-password")
            .with_body(serde_json::to_value(&body)?);
        self.client.acknowledge(&request)
    }

    pub fn update(&self, update: &ProfileUpdate) -> Result<Option<String>> {
        if update.is_empty() {
            return Err(LabError::validation("profile", "nothing to update"));
        }
        let request = self
            .client
            .request(Method::Put, "/user/update")
            .with_body(serde_json::to_value(update)?);
        self.client.acknowledge(&request)
    }

    /// Flip two-factor sign-in for the current user.
    pub fn toggle_tfa(&self) -> Result<Option<String>> {
        let request = self.client.request(Method::Put, "/user/toggle-tfa");
        self.client.acknowledge(&request)
    }
}
