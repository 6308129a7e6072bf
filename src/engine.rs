//! The boundary contract with the flag evaluation engine.
//!
//! The engine owns configuration fetching, targeting rules and percentage
//! rollouts. This crate consumes it exclusively through the narrow interface
//! below: a replaceable [`EngineSnapshot`] for typed per-key evaluation, a
//! readiness wait, and a configuration-change subscription.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::user::EngineUser;
use crate::Str;

/// Readiness of the engine's configuration data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfigState {
    /// No usable flag data is available yet.
    NoFlagData,
    /// Only local override data is loaded.
    HasLocalOverrideFlagDataOnly,
    /// Only cached (possibly stale) data is loaded.
    HasCachedFlagDataOnly,
    /// Fresh configuration has been fetched.
    HasUpToDateFlagData,
}

impl ConfigState {
    /// Whether this state carries flag data an evaluation could use.
    pub fn has_flag_data(self) -> bool {
        self != ConfigState::NoFlagData
    }
}

/// Engine-side error classification for a single evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum EvaluationErrorCode {
    /// The evaluation completed without error.
    None,
    /// An unclassified failure inside the engine.
    UnexpectedError,
    /// The configuration model is invalid.
    InvalidConfigModel,
    /// Configuration JSON was not available for evaluation.
    ConfigJsonNotAvailable,
    /// The setting exists but its value has a different type than requested.
    SettingValueTypeMismatch,
    /// The requested setting key does not exist in the configuration.
    SettingKeyMissing,
}

/// Typed result of a single engine evaluation. Read-only to this crate;
/// engine-originated fields pass through the result mapper verbatim.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationDetails<T> {
    /// Resolved value, or the caller-supplied default on failure.
    pub value: T,
    /// Identifier of the variation that produced the value.
    pub variation_id: Option<Str>,
    /// A targeting rule matched for this user.
    pub matched_targeting_rule: bool,
    /// A percentage option matched for this user.
    pub matched_percentage_option: bool,
    pub error_code: EvaluationErrorCode,
    pub error_message: Option<String>,
}

impl<T> EvaluationDetails<T> {
    /// Details for a successfully resolved value.
    pub fn resolved(value: T) -> EvaluationDetails<T> {
        EvaluationDetails {
            value,
            variation_id: None,
            matched_targeting_rule: false,
            matched_percentage_option: false,
            error_code: EvaluationErrorCode::None,
            error_message: None,
        }
    }

    /// Details carrying the caller-supplied default and an error
    /// classification.
    pub fn failed(
        default: T,
        error_code: EvaluationErrorCode,
        message: impl Into<String>,
    ) -> EvaluationDetails<T> {
        EvaluationDetails {
            value: default,
            variation_id: None,
            matched_targeting_rule: false,
            matched_percentage_option: false,
            error_code,
            error_message: Some(message.into()),
        }
    }

    /// Tag the details with the variation that produced the value.
    pub fn with_variation_id(mut self, variation_id: impl Into<Str>) -> EvaluationDetails<T> {
        self.variation_id = Some(variation_id.into());
        self
    }
}

/// Callback invoked by the engine whenever a new configuration snapshot is
/// installed, including refreshes from background polling. May fire on an
/// arbitrary engine-internal thread.
pub type ConfigChangedHook = Box<dyn Fn(Arc<dyn EngineSnapshot>) + Send + Sync>;

/// Handle to the engine: snapshot access, readiness and lifecycle.
#[async_trait]
pub trait FlagEngine: Send + Sync {
    /// Latest-known immutable view of configuration and evaluation
    /// capability.
    fn snapshot(&self) -> Arc<dyn EngineSnapshot>;

    /// Suspend until the engine first settles on a configuration state.
    ///
    /// Dropping the returned future is safe; it has no side effects on the
    /// engine or the caller.
    async fn wait_for_ready(&self) -> ConfigState;

    /// Register `hook` to run on every configuration change.
    fn on_config_changed(&self, hook: ConfigChangedHook);

    /// Release engine resources.
    fn close(&self);
}

/// Point-in-time view of engine configuration, sufficient to evaluate keys.
///
/// Snapshots are immutable; a reader uses the same snapshot for the whole
/// operation and is unaffected by concurrent configuration updates.
pub trait EngineSnapshot: Send + Sync {
    /// State of the configuration data backing this snapshot.
    fn config_state(&self) -> ConfigState;

    fn bool_details(
        &self,
        key: &str,
        default: bool,
        user: Option<&EngineUser>,
    ) -> EvaluationDetails<bool>;

    fn int_details(
        &self,
        key: &str,
        default: i64,
        user: Option<&EngineUser>,
    ) -> EvaluationDetails<i64>;

    fn float_details(
        &self,
        key: &str,
        default: f64,
        user: Option<&EngineUser>,
    ) -> EvaluationDetails<f64>;

    fn string_details(
        &self,
        key: &str,
        default: String,
        user: Option<&EngineUser>,
    ) -> EvaluationDetails<String>;
}

/// Value types the engine can evaluate directly.
///
/// Dispatches the provider's generic evaluation helper to the matching typed
/// method on [`EngineSnapshot`]. Object-typed evaluation is layered on top of
/// string evaluation and is not part of this set.
pub trait SettingValue: private::Sealed + Sized {
    fn eval_details(
        snapshot: &dyn EngineSnapshot,
        key: &str,
        default: Self,
        user: Option<&EngineUser>,
    ) -> EvaluationDetails<Self>;
}

mod private {
    pub trait Sealed {}
    impl Sealed for bool {}
    impl Sealed for i64 {}
    impl Sealed for f64 {}
    impl Sealed for String {}
}

impl SettingValue for bool {
    fn eval_details(
        snapshot: &dyn EngineSnapshot,
        key: &str,
        default: Self,
        user: Option<&EngineUser>,
    ) -> EvaluationDetails<Self> {
        snapshot.bool_details(key, default, user)
    }
}

impl SettingValue for i64 {
    fn eval_details(
        snapshot: &dyn EngineSnapshot,
        key: &str,
        default: Self,
        user: Option<&EngineUser>,
    ) -> EvaluationDetails<Self> {
        snapshot.int_details(key, default, user)
    }
}

impl SettingValue for f64 {
    fn eval_details(
        snapshot: &dyn EngineSnapshot,
        key: &str,
        default: Self,
        user: Option<&EngineUser>,
    ) -> EvaluationDetails<Self> {
        snapshot.float_details(key, default, user)
    }
}

impl SettingValue for String {
    fn eval_details(
        snapshot: &dyn EngineSnapshot,
        key: &str,
        default: Self,
        user: Option<&EngineUser>,
    ) -> EvaluationDetails<Self> {
        snapshot.string_details(key, default, user)
    }
}
