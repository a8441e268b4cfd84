//! HTTP login client driven by the [`LoginInterceptor`].

use std::time::Instant;

use thiserror::Error;
use tracing::debug;

use crate::{
    config::PluginSettings,
    interceptor::{form_to_json, LoginInterceptor, LoginReply, ReplyAction, SubmitDecision},
};

/// Errors from [`LoginClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request could not be sent or its response not read.
    #[error("login request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// How a submission ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientOutcome {
    /// The JSON login produced a token.
    LoggedIn {
        /// Session token, also kept by the client.
        token: String,
        /// Where the admin UI should go next.
        navigate_to: String,
    },
    /// The form went through the default submission.
    Fallback {
        /// HTTP status of the default submission.
        status: u16,
        /// Token, if the default submission produced one.
        token: Option<String>,
    },
}

/// Submits login forms the way the admin UI does.
pub struct LoginClient {
    http: reqwest::Client,
    base_url: String,
    api_prefix: String,
    interceptor: LoginInterceptor,
    token: Option<String>,
}

impl LoginClient {
    /// A client for the server at `base_url`.
    pub fn new(base_url: impl Into<String>, settings: &PluginSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_prefix: settings.api_prefix.clone(),
            interceptor: LoginInterceptor::new(settings.rearm_delay(), &settings.admin_route),
            token: None,
        }
    }

    /// Uses a preconfigured [`reqwest::Client`].
    #[must_use]
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// The session token from the last successful login.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Submits a login form for `collection`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] if a request cannot be completed. A
    /// rejected login is not an error.
    pub async fn submit(
        &mut self,
        collection: &str,
        form: &[(&str, &str)],
    ) -> Result<ClientOutcome, ClientError> {
        let url = self.login_url(collection);

        if self.interceptor.on_submit(Instant::now()) == SubmitDecision::UseDefault {
            debug!(%url, "interception paused, using default submission");
            return self.submit_default(&url, form).await;
        }

        let body = form_to_json(form.iter().copied());
        let response = self.http.post(&url).json(&body).send().await?;
        let reply = response.json::<LoginReply>().await.unwrap_or_default();

        match self.interceptor.on_json_reply(reply, Instant::now()) {
            ReplyAction::StoreTokenAndNavigate { token, route } => {
                debug!(%url, "json login succeeded");
                self.token = Some(token.clone());
                Ok(ClientOutcome::LoggedIn {
                    token,
                    navigate_to: route,
                })
            }
            ReplyAction::ResubmitDefault => {
                debug!(%url, "json login failed, resubmitting without interception");
                let outcome = self.submit_default(&url, form).await;
                self.interceptor.on_fallback_complete();
                outcome
            }
        }
    }

    async fn submit_default(
        &mut self,
        url: &str,
        form: &[(&str, &str)],
    ) -> Result<ClientOutcome, ClientError> {
        let response = self.http.post(url).form(form).send().await?;
        let status = response.status().as_u16();
        let reply = response.json::<LoginReply>().await.unwrap_or_default();

        let token = reply.token.filter(|token| !token.is_empty());
        if let Some(token) = &token {
            self.token = Some(token.clone());
        }

        Ok(ClientOutcome::Fallback { status, token })
    }

    fn login_url(&self, collection: &str) -> String {
        format!(
            "{}{}/{collection}/login",
            self.base_url.trim_end_matches('/'),
            self.api_prefix.trim_end_matches('/'),
        )
    }
}
