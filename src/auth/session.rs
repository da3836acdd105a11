//! Sign-in, sign-out and the password-reset / one-time-code flows under `/auth`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::api::client::ApiClient;
use crate::api::request::{ApiRequest, Method};
use crate::auth::tokens::{SessionTokens, TokenStore, fingerprint};
use crate::auth::validate;
use crate::core::errors::{LabError, Result};
use crate::logger::activity::ActivityEvent;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    #[serde(skip)]
    pub confirm_password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

impl Registration {
    pub fn validate(&self) -> Result<()> {
        validate::required("firstName", &self.first_name)?;
        validate::required("lastName", &self.last_name)?;
        validate::email(&self.email)?;
        validate::password("password", &self.password)?;
        validate::confirmation(&self.password, &self.confirm_password)
    }
}

/// Reply of `/auth/login`, `/auth/verify-otp` and `/auth/verify-qr`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub mfa_enabled: bool,
    /// Data URI of the authenticator QR code, sent on first two-factor login.
    #[serde(default)]
    pub secret_image_uri: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Authenticated,
    /// Password accepted; a one-time code must be verified next.
    TwoFactorRequired { email: String, qr: Option<String> },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmailOnly<'a> {
    email: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CodeCheck<'a> {
    email: &'a str,
    code: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordReset<'a> {
    email: &'a str,
    code: &'a str,
    new_password: &'a str,
    confirm_password: &'a str,
}

pub struct AuthService {
    client: ApiClient,
}

impl AuthService {
    #[must_use]
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    #[must_use]
    pub fn tokens(&self) -> &Arc<TokenStore> {
        self.client.tokens()
    }

    pub fn register(&self, registration: &Registration) -> Result<Option<String>> {
        registration.validate()?;
        self.anonymous("/auth/register", registration)
    }

    /// Check the credentials and store the session, unless a second factor is required.
    pub fn login(&self, email: &str, password: &str) -> Result<LoginOutcome> {
        validate::email(email)?;
        validate::required("password", password)?;
        let email = email.trim();
        let reply: AuthenticationResponse = self
            .client
            .post_anonymous("/auth/login", &Credentials { email, password })?;

        if reply.mfa_enabled && reply.access_token.is_none() {
            return Ok(LoginOutcome::TwoFactorRequired {
                email: email.to_string(),
                qr: reply.secret_image_uri,
            });
        }
        self.establish(email, reply)?;
        Ok(LoginOutcome::Authenticated)
    }

    /// End the session. Local tokens are cleared even if the backend call fails;
    /// that failure is still returned afterwards.
    pub fn logout(&self) -> Result<()> {
        let request = self.client.request(Method::Post, "/auth/logout");
        let remote = if request.context.is_authenticated() {
            self.client.execute(&request).map(|_| ())
        } else {
            Ok(())
        };
        self.tokens().clear()?;
        if let Some(activity) = self.client.activity() {
            activity.send(ActivityEvent::LoggedOut);
        }
        remote
    }

    pub fn forgot_password(&self, email: &str) -> Result<Option<String>> {
        validate::email(email)?;
        self.anonymous("/auth/forgot-password", &EmailOnly { email: email.trim() })
    }

    pub fn validate_reset_code(&self, email: &str, code: &str) -> Result<Option<String>> {
        validate::email(email)?;
        validate::otp(code)?;
        self.anonymous(
            "/auth/validate-reset-code",
            &CodeCheck {
                email: email.trim(),
                code: code.trim(),
            },
        )
    }

    pub fn reset_password(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<Option<String>> {
        validate::email(email)?;
        validate::otp(code)?;
        validate::password("newPassword", new_password)?;
        validate::confirmation(new_password, confirm_password)?;
        self.anonymous(
            "/auth/reset-password",
            &PasswordReset {
                email: email.trim(),
                code: code.trim(),
                new_password,
                confirm_password,
            },
        )
    }

    /// Confirm the authenticator was set up from the QR code; signs in on success.
    pub fn verify_qr(&self, email: &str, code: &str) -> Result<()> {
        self.verify("/auth/verify-qr", email, code)
    }

    /// Second login step.
    pub fn verify_otp(&self, email: &str, code: &str) -> Result<()> {
        self.verify("/auth/verify-otp", email, code)
    }

    /// Ask the backend to mail a one-time code instead of using the authenticator.
    pub fn email_otp(&self, email: &str) -> Result<Option<String>> {
        validate::email(email)?;
        self.anonymous("/auth/email-otp", &EmailOnly { email: email.trim() })
    }

    fn verify(&self, path: &str, email: &str, code: &str) -> Result<()> {
        validate::email(email)?;
        validate::otp(code)?;
        let email = email.trim();
        let reply: AuthenticationResponse = self.client.post_anonymous(
            path,
            &CodeCheck {
                email,
                code: code.trim(),
            },
        )?;
        self.establish(email, reply)
    }

    fn establish(&self, email: &str, reply: AuthenticationResponse) -> Result<()> {
        let Some(access) = reply.access_token.filter(|t| !t.trim().is_empty()) else {
            return Err(LabError::Serialization {
                context: "authentication response",
                details: "missing accessToken".to_string(),
            });
        };
        let token_fp = fingerprint(&access);
        self.tokens()
            .save(SessionTokens::new(access, reply.refresh_token.as_deref()))?;
        if let Some(activity) = self.client.activity() {
            activity.send(ActivityEvent::LoggedIn {
                user: email.to_string(),
                token_fp,
            });
        }
        Ok(())
    }

    fn anonymous<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Option<String>> {
        let request = ApiRequest::new(Method::Post, path).with_body(serde_json::to_value(body)?);
        self.client.acknowledge(&request)
    }
}
