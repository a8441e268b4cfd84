//! Client-side login interception as an explicit state machine.
//!
//! The first submission of the login form goes out as a JSON POST so the
//! migration gate can read it. If that does not produce a token, the form is
//! submitted once more the default way and interception is switched off for
//! a short delay.

use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::{Map, Value};

/// Interception state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InterceptState {
    /// Submissions are sent as JSON.
    Intercepting,
    /// Submissions use the default mechanism until `until`.
    Bypassing {
        /// When interception re-arms.
        until: Instant,
    },
}

/// What to do with a form submission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitDecision {
    /// Suppress the default submission and POST the fields as JSON.
    SendJson,
    /// Let the default submission through.
    UseDefault,
}

/// What to do after the JSON POST answered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReplyAction {
    /// Store the token and navigate to `route`.
    StoreTokenAndNavigate {
        /// Session token from the reply.
        token: String,
        /// Admin landing route.
        route: String,
    },
    /// Submit the form again through the default mechanism, once.
    ResubmitDefault,
}

/// The parts of a login reply the interceptor looks at.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct LoginReply {
    /// Present on success.
    #[serde(default)]
    pub token: Option<String>,
}

/// The interceptor state machine.
#[derive(Clone, Debug)]
pub struct LoginInterceptor {
    state: InterceptState,
    rearm_delay: Duration,
    admin_route: String,
}

impl LoginInterceptor {
    /// A new interceptor in the [`InterceptState::Intercepting`] state.
    pub fn new(rearm_delay: Duration, admin_route: impl Into<String>) -> Self {
        Self {
            state: InterceptState::Intercepting,
            rearm_delay,
            admin_route: admin_route.into(),
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> InterceptState {
        self.state
    }

    /// Re-arms interception once the bypass delay has elapsed.
    pub fn poll(&mut self, now: Instant) {
        if let InterceptState::Bypassing { until } = self.state {
            if now >= until {
                self.state = InterceptState::Intercepting;
            }
        }
    }

    /// Decides how the form submission at `now` goes out.
    pub fn on_submit(&mut self, now: Instant) -> SubmitDecision {
        self.poll(now);
        match self.state {
            InterceptState::Intercepting => SubmitDecision::SendJson,
            InterceptState::Bypassing { .. } => SubmitDecision::UseDefault,
        }
    }

    /// Handles the reply to the JSON POST.
    ///
    /// A reply without a token switches to bypass mode and asks for exactly
    /// one default resubmission.
    pub fn on_json_reply(&mut self, reply: LoginReply, now: Instant) -> ReplyAction {
        match reply.token.filter(|token| !token.is_empty()) {
            Some(token) => {
                self.state = InterceptState::Intercepting;
                ReplyAction::StoreTokenAndNavigate {
                    token,
                    route: self.admin_route.clone(),
                }
            }
            None => {
                self.state = InterceptState::Bypassing {
                    until: now + self.rearm_delay,
                };
                ReplyAction::ResubmitDefault
            }
        }
    }

    /// The default resubmission has finished; intercept again.
    pub fn on_fallback_complete(&mut self) {
        self.state = InterceptState::Intercepting;
    }
}

/// Flattens form fields into a JSON object. The last value of a repeated key
/// wins.
pub fn form_to_json<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Value
where
    K: Into<String>,
    V: Into<String>,
{
    let object: Map<String, Value> = fields
        .into_iter()
        .map(|(key, value)| (key.into(), Value::String(value.into())))
        .collect();
    Value::Object(object)
}

#[cfg(test)]
mod test {
    use std::time::{Duration, Instant};

    use serde_json::json;

    use super::{
        form_to_json, InterceptState, LoginInterceptor, LoginReply, ReplyAction, SubmitDecision,
    };

    fn interceptor() -> LoginInterceptor {
        LoginInterceptor::new(Duration::from_millis(100), "/admin")
    }

    #[test]
    fn success_navigates_to_admin() {
        let now = Instant::now();
        let mut interceptor = interceptor();

        assert_eq!(interceptor.on_submit(now), SubmitDecision::SendJson);
        let action = interceptor.on_json_reply(
            LoginReply {
                token: Some("abc".into()),
            },
            now,
        );

        assert_eq!(
            action,
            ReplyAction::StoreTokenAndNavigate {
                token: "abc".into(),
                route: "/admin".into(),
            }
        );
        assert_eq!(interceptor.state(), InterceptState::Intercepting);
    }

    #[test]
    fn failure_bypasses_then_rearms_after_the_delay() {
        let now = Instant::now();
        let mut interceptor = interceptor();

        interceptor.on_submit(now);
        let action = interceptor.on_json_reply(LoginReply::default(), now);
        assert_eq!(action, ReplyAction::ResubmitDefault);

        assert_eq!(
            interceptor.on_submit(now + Duration::from_millis(10)),
            SubmitDecision::UseDefault
        );
        assert_eq!(
            interceptor.on_submit(now + Duration::from_millis(100)),
            SubmitDecision::SendJson
        );
    }

    #[test]
    fn fallback_completion_rearms_immediately() {
        let now = Instant::now();
        let mut interceptor = interceptor();

        interceptor.on_json_reply(LoginReply::default(), now);
        assert!(matches!(
            interceptor.state(),
            InterceptState::Bypassing { .. }
        ));

        interceptor.on_fallback_complete();
        assert_eq!(interceptor.on_submit(now), SubmitDecision::SendJson);
    }

    #[test]
    fn empty_token_counts_as_failure() {
        let mut interceptor = interceptor();
        let action = interceptor.on_json_reply(
            LoginReply {
                token: Some(String::new()),
            },
            Instant::now(),
        );
        assert_eq!(action, ReplyAction::ResubmitDefault);
    }

    #[test]
    fn reply_parsing_tolerates_error_shapes() {
        let reply: LoginReply = serde_json::from_value(json!({
            "errors": [{ "message": "The email or password provided is incorrect." }]
        }))
        .unwrap();
        assert_eq!(reply.token, None);
    }

    #[test]
    fn form_fields_flatten_into_an_object() {
        let body = form_to_json([
            ("email", "a@b.com"),
            ("password", "first"),
            ("password", "second"),
        ]);
        assert_eq!(body, json!({ "email": "a@b.com", "password": "second" }));
    }
}
