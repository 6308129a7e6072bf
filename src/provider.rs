//! The provider facade: composes the context mapper, the engine snapshot
//! lookup and the result mapper behind the host runtime's fixed contract.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::context::EvaluationContext;
use crate::engine::{EngineSnapshot, FlagEngine, SettingValue};
use crate::error::{Error, Result};
use crate::evaluation::{ErrorCode, ProviderEvaluation, Reason};
use crate::events::EventStream;
use crate::options::ProviderOptions;
use crate::readiness::ReadinessGate;
use crate::user::EngineUser;
use crate::value::Value;

/// Fixed provider name reported through [`ProviderMetadata`].
pub const PROVIDER_NAME: &str = "FlagBridge";

/// Static descriptive metadata for a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderMetadata {
    /// Human-readable provider name.
    pub name: &'static str,
}

/// The contract the host runtime programs against.
///
/// Lifecycle methods are driven by the host; evaluation methods are
/// synchronous and never block. Evaluation failures are returned as data,
/// never as `Err`.
#[async_trait]
pub trait FeatureProvider: Send + Sync {
    /// Static provider metadata.
    fn metadata(&self) -> &ProviderMetadata;

    /// Record the user derived from `initial_context` and suspend until the
    /// engine reports a configuration state.
    ///
    /// # Errors
    ///
    /// [`Error::ReadyTimeout`] when a readiness deadline is configured and
    /// the engine does not report a state in time.
    async fn initialize(&self, initial_context: Option<&EvaluationContext>) -> Result<()>;

    /// Replace the current user with the mapping of `new_context`. Never
    /// re-triggers readiness.
    async fn on_context_set(
        &self,
        old_context: Option<&EvaluationContext>,
        new_context: &EvaluationContext,
    );

    fn resolve_bool(
        &self,
        key: &str,
        default_value: bool,
        context: Option<&EvaluationContext>,
    ) -> ProviderEvaluation<bool>;

    fn resolve_int(
        &self,
        key: &str,
        default_value: i64,
        context: Option<&EvaluationContext>,
    ) -> ProviderEvaluation<i64>;

    fn resolve_float(
        &self,
        key: &str,
        default_value: f64,
        context: Option<&EvaluationContext>,
    ) -> ProviderEvaluation<f64>;

    fn resolve_string(
        &self,
        key: &str,
        default_value: String,
        context: Option<&EvaluationContext>,
    ) -> ProviderEvaluation<String>;

    fn resolve_object(
        &self,
        key: &str,
        default_value: Value,
        context: Option<&EvaluationContext>,
    ) -> ProviderEvaluation<Value>;

    /// Observe provider events. A subscriber attaching after readiness
    /// already fired still observes the ready event (replay semantics).
    fn observe(&self) -> EventStream;

    /// Release the underlying engine.
    fn shutdown(&self);
}

/// Thread-safe holder for the latest engine snapshot.
///
/// Snapshots are immutable and only ever replaced wholesale, so readers get
/// a consistent view for the duration of an evaluation.
struct SnapshotStore {
    snapshot: RwLock<Option<Arc<dyn EngineSnapshot>>>,
}

impl SnapshotStore {
    fn new() -> SnapshotStore {
        SnapshotStore {
            snapshot: RwLock::new(None),
        }
    }

    fn get(&self) -> Option<Arc<dyn EngineSnapshot>> {
        let snapshot = self
            .snapshot
            .read()
            .expect("thread holding snapshot lock should not panic");

        snapshot.clone()
    }

    fn replace(&self, snapshot: Arc<dyn EngineSnapshot>) {
        let mut slot = self
            .snapshot
            .write()
            .expect("thread holding snapshot lock should not panic");

        *slot = Some(snapshot);
    }
}

/// Feature-flag provider backed by a flag evaluation engine.
///
/// Holds the latest configuration snapshot and the latest engine user, both
/// replaced wholesale; every typed evaluation runs context resolution, a
/// snapshot lookup and result mapping without blocking.
///
/// # Examples
/// ```no_run
/// # use std::sync::Arc;
/// # use flagbridge::{engine::FlagEngine, EngineProvider, FeatureProvider};
/// # async fn demo(engine: Arc<dyn FlagEngine>) -> flagbridge::Result<()> {
/// let provider = EngineProvider::new(engine);
/// provider.initialize(None).await?;
/// let enabled = provider.resolve_bool("new-checkout", false, None);
/// # Ok(())
/// # }
/// ```
pub struct EngineProvider {
    metadata: ProviderMetadata,
    options: ProviderOptions,
    engine: Arc<dyn FlagEngine>,
    snapshot: Arc<SnapshotStore>,
    user: RwLock<Option<Arc<EngineUser>>>,
    readiness: Arc<ReadinessGate>,
}

impl EngineProvider {
    /// Create a provider over `engine` with default options.
    pub fn new(engine: Arc<dyn FlagEngine>) -> EngineProvider {
        EngineProvider::with_options(engine, ProviderOptions::default())
    }

    /// Create a provider over `engine`.
    ///
    /// Registers a configuration-change hook with the engine: every
    /// notification replaces the held snapshot, and the first one carrying
    /// flag data emits the one-shot ready event.
    pub fn with_options(engine: Arc<dyn FlagEngine>, options: ProviderOptions) -> EngineProvider {
        let snapshot = Arc::new(SnapshotStore::new());
        let readiness = Arc::new(ReadinessGate::new());

        engine.on_config_changed({
            let snapshot = Arc::clone(&snapshot);
            let readiness = Arc::clone(&readiness);
            Box::new(move |new_snapshot| {
                let state = new_snapshot.config_state();
                snapshot.replace(new_snapshot);
                log::debug!(target: "flagbridge", state:? = state; "configuration changed");
                readiness.signal(state);
            })
        });

        EngineProvider {
            metadata: ProviderMetadata {
                name: PROVIDER_NAME,
            },
            options,
            engine,
            snapshot,
            user: RwLock::new(None),
            readiness,
        }
    }

    fn set_user(&self, user: Option<EngineUser>) {
        let mut slot = self
            .user
            .write()
            .expect("thread holding user lock should not panic");

        *slot = user.map(Arc::new);
    }

    /// The explicitly-set user takes priority; a call-scoped context is only
    /// a fallback when no context has ever been set.
    fn resolve_user(&self, context: Option<&EvaluationContext>) -> Option<Arc<EngineUser>> {
        let held = self
            .user
            .read()
            .expect("thread holding user lock should not panic")
            .clone();

        held.or_else(|| context.map(|context| Arc::new(context.to_engine_user())))
    }

    /// The held snapshot, falling back to asking the engine directly if none
    /// has been cached yet.
    fn resolve_snapshot(&self) -> Arc<dyn EngineSnapshot> {
        self.snapshot.get().unwrap_or_else(|| self.engine.snapshot())
    }

    fn eval<T: SettingValue>(
        &self,
        key: &str,
        default_value: T,
        context: Option<&EvaluationContext>,
    ) -> ProviderEvaluation<T> {
        let snapshot = self.resolve_snapshot();
        let user = self.resolve_user(context);
        let details = T::eval_details(&*snapshot, key, default_value, user.as_deref());
        details.into()
    }
}

#[async_trait]
impl FeatureProvider for EngineProvider {
    fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    async fn initialize(&self, initial_context: Option<&EvaluationContext>) -> Result<()> {
        self.set_user(initial_context.map(EvaluationContext::to_engine_user));

        // Cancellation-safe: the readiness flag is only touched after the
        // wait completes, so an abandoned wait cannot leave it stuck.
        let state = match self.options.ready_timeout {
            Some(deadline) => tokio::time::timeout(deadline, self.engine.wait_for_ready())
                .await
                .map_err(|_| Error::ReadyTimeout)?,
            None => self.engine.wait_for_ready().await,
        };
        self.readiness.signal(state);

        Ok(())
    }

    async fn on_context_set(
        &self,
        _old_context: Option<&EvaluationContext>,
        new_context: &EvaluationContext,
    ) {
        self.set_user(Some(new_context.to_engine_user()));
    }

    fn resolve_bool(
        &self,
        key: &str,
        default_value: bool,
        context: Option<&EvaluationContext>,
    ) -> ProviderEvaluation<bool> {
        self.eval(key, default_value, context)
    }

    fn resolve_int(
        &self,
        key: &str,
        default_value: i64,
        context: Option<&EvaluationContext>,
    ) -> ProviderEvaluation<i64> {
        self.eval(key, default_value, context)
    }

    fn resolve_float(
        &self,
        key: &str,
        default_value: f64,
        context: Option<&EvaluationContext>,
    ) -> ProviderEvaluation<f64> {
        self.eval(key, default_value, context)
    }

    fn resolve_string(
        &self,
        key: &str,
        default_value: String,
        context: Option<&EvaluationContext>,
    ) -> ProviderEvaluation<String> {
        self.eval(key, default_value, context)
    }

    fn resolve_object(
        &self,
        key: &str,
        default_value: Value,
        context: Option<&EvaluationContext>,
    ) -> ProviderEvaluation<Value> {
        // Object values are string-encoded JSON in the engine; evaluate as a
        // string and convert.
        let string_result = self.eval(key, String::new(), context);
        if string_result.value.is_empty() {
            return ProviderEvaluation {
                value: default_value,
                variant: None,
                reason: string_result.reason,
                error_code: string_result.error_code,
                error_message: string_result.error_message,
            };
        }
        match serde_json::from_str::<serde_json::Value>(&string_result.value) {
            Ok(json) => {
                let value = Value::from_json(&json);
                string_result.with_value(value)
            }
            Err(err) => ProviderEvaluation {
                value: default_value,
                variant: None,
                reason: Reason::Error,
                error_code: Some(ErrorCode::TypeMismatch),
                error_message: Some(format!(
                    "Could not parse '{}' as JSON ({err})",
                    string_result.value
                )),
            },
        }
    }

    fn observe(&self) -> EventStream {
        self.readiness.subscribe()
    }

    fn shutdown(&self) {
        log::debug!(target: "flagbridge", "shutting down provider");
        self.engine.close();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    use super::{EngineProvider, FeatureProvider, PROVIDER_NAME};
    use crate::context::EvaluationContext;
    use crate::engine::ConfigState;
    use crate::error::Error;
    use crate::evaluation::{ErrorCode, Reason};
    use crate::events::ProviderEvent;
    use crate::options::ProviderOptions;
    use crate::test_common::{TestEngine, TestSetting, TestValue};
    use crate::value::Value;

    fn settings() -> HashMap<String, TestSetting> {
        [
            (
                "enabledFeature".to_owned(),
                TestSetting::new(TestValue::Bool(true)).with_variation_id("v-enabled"),
            ),
            (
                "targetedFeature".to_owned(),
                TestSetting::new(TestValue::Bool(true))
                    .with_variation_id("v-targeted")
                    .matched_by_targeting(),
            ),
            (
                "intSetting".to_owned(),
                TestSetting::new(TestValue::Int(5)).with_variation_id("v-int"),
            ),
            (
                "discountRate".to_owned(),
                TestSetting::new(TestValue::Float(0.25)),
            ),
            (
                "objectSetting".to_owned(),
                TestSetting::new(TestValue::String(
                    "{\"bool_field\": true, \"text_field\": \"value\"}".to_owned(),
                ))
                .with_variation_id("v-object"),
            ),
            (
                "emptySetting".to_owned(),
                TestSetting::new(TestValue::String(String::new())),
            ),
            (
                "brokenObjectSetting".to_owned(),
                TestSetting::new(TestValue::String("{not json}".to_owned())),
            ),
        ]
        .into_iter()
        .collect()
    }

    fn provider() -> (Arc<TestEngine>, EngineProvider) {
        let engine = Arc::new(TestEngine::new(settings()));
        let provider = EngineProvider::new(Arc::clone(&engine) as Arc<dyn crate::engine::FlagEngine>);
        (engine, provider)
    }

    #[test]
    fn metadata_reports_the_fixed_provider_name() {
        let (_engine, provider) = provider();

        assert_eq!(provider.metadata().name, PROVIDER_NAME);
    }

    #[test]
    fn bool_evaluation_returns_value_and_variant() {
        let (_engine, provider) = provider();

        let result = provider.resolve_bool("enabledFeature", false, None);

        assert!(result.value);
        assert_eq!(result.variant, Some("v-enabled".into()));
        assert_eq!(result.reason, Reason::Default);
        assert_eq!(result.error_code, None);
    }

    #[test]
    fn matched_targeting_rule_reports_targeting_match() {
        let (_engine, provider) = provider();

        let result = provider.resolve_bool("targetedFeature", false, None);

        assert!(result.value);
        assert_eq!(result.reason, Reason::TargetingMatch);
    }

    #[test]
    fn int_and_float_evaluations_return_typed_values() {
        let (_engine, provider) = provider();

        let int_result = provider.resolve_int("intSetting", 0, None);
        assert_eq!(int_result.value, 5);
        assert_eq!(int_result.variant, Some("v-int".into()));

        let float_result = provider.resolve_float("discountRate", 0.0, None);
        assert_eq!(float_result.value, 0.25);
        assert_eq!(float_result.reason, Reason::Default);
    }

    #[test]
    fn missing_key_returns_default_with_flag_not_found() {
        let (_engine, provider) = provider();

        let result = provider.resolve_int("non-existing", 0, None);

        assert_eq!(result.value, 0);
        assert_eq!(result.reason, Reason::Error);
        assert_eq!(result.error_code, Some(ErrorCode::FlagNotFound));
        assert!(result.error_message.is_some());
    }

    #[test]
    fn type_mismatch_returns_default_with_type_mismatch() {
        let (_engine, provider) = provider();

        let result = provider.resolve_string("enabledFeature", "fallback".to_owned(), None);

        assert_eq!(result.value, "fallback");
        assert_eq!(result.reason, Reason::Error);
        assert_eq!(result.error_code, Some(ErrorCode::TypeMismatch));
    }

    #[test]
    fn object_evaluation_parses_string_encoded_json() {
        let (_engine, provider) = provider();

        let result = provider.resolve_object("objectSetting", Value::Null, None);

        let Value::Struct(members) = &result.value else {
            panic!("expected a structure, got {:?}", result.value);
        };
        assert_eq!(members.get("bool_field"), Some(&Value::Bool(true)));
        assert_eq!(
            members.get("text_field"),
            Some(&Value::String("value".to_owned()))
        );
        assert_eq!(result.variant, Some("v-object".into()));
        assert_eq!(result.reason, Reason::Default);
    }

    #[test]
    fn object_evaluation_on_empty_string_returns_default_with_underlying_reason() {
        let (_engine, provider) = provider();
        let default = Value::Struct(HashMap::new());

        let result = provider.resolve_object("emptySetting", default.clone(), None);

        assert_eq!(result.value, default);
        assert_eq!(result.variant, None);
        assert_eq!(result.reason, Reason::Default);
        assert_eq!(result.error_code, None);
    }

    #[test]
    fn object_evaluation_on_missing_key_returns_default_with_underlying_error() {
        let (_engine, provider) = provider();

        let result = provider.resolve_object("non-existing", Value::Null, None);

        assert_eq!(result.value, Value::Null);
        assert_eq!(result.reason, Reason::Error);
        assert_eq!(result.error_code, Some(ErrorCode::FlagNotFound));
    }

    #[test]
    fn object_evaluation_on_malformed_json_embeds_the_raw_text() {
        let (_engine, provider) = provider();
        let default = Value::Bool(false);

        let result = provider.resolve_object("brokenObjectSetting", default.clone(), None);

        assert_eq!(result.value, default);
        assert_eq!(result.reason, Reason::Error);
        assert_eq!(result.error_code, Some(ErrorCode::TypeMismatch));
        let message = result.error_message.expect("message should be present");
        assert!(message.contains("{not json}"), "unexpected message: {message}");
    }

    #[tokio::test]
    async fn initialize_records_the_initial_user() {
        let (engine, provider) = provider();
        let context = EvaluationContext::new("user-1").with_attribute("Email", "jane@example.com");

        provider.initialize(Some(&context)).await.unwrap();
        provider.resolve_bool("enabledFeature", false, None);

        let user = engine.last_user().flatten().expect("user should be set");
        assert_eq!(&*user.identifier, "user-1");
        assert_eq!(user.email.as_deref(), Some("jane@example.com"));
    }

    #[tokio::test]
    async fn held_user_takes_priority_over_call_scoped_context() {
        let (engine, provider) = provider();
        provider
            .initialize(Some(&EvaluationContext::new("held-user")))
            .await
            .unwrap();

        let call_context = EvaluationContext::new("call-user");
        provider.resolve_bool("enabledFeature", false, Some(&call_context));

        let user = engine.last_user().flatten().expect("user should be set");
        assert_eq!(&*user.identifier, "held-user");
    }

    #[test]
    fn call_scoped_context_is_used_when_no_user_was_ever_set() {
        let (engine, provider) = provider();

        let call_context = EvaluationContext::new("call-user");
        provider.resolve_bool("enabledFeature", false, Some(&call_context));

        let user = engine.last_user().flatten().expect("user should be set");
        assert_eq!(&*user.identifier, "call-user");
    }

    #[tokio::test]
    async fn on_context_set_replaces_the_held_user() {
        let (engine, provider) = provider();
        provider
            .initialize(Some(&EvaluationContext::new("before")))
            .await
            .unwrap();

        let new_context = EvaluationContext::new("after");
        provider.on_context_set(None, &new_context).await;
        provider.resolve_bool("enabledFeature", false, None);

        let user = engine.last_user().flatten().expect("user should be set");
        assert_eq!(&*user.identifier, "after");
    }

    #[test]
    fn evaluation_without_any_context_passes_no_user() {
        let (engine, provider) = provider();

        provider.resolve_bool("enabledFeature", false, None);

        assert_eq!(engine.last_user(), Some(None));
    }

    #[test]
    fn snapshot_falls_back_to_the_engine_until_one_is_cached() {
        let (engine, provider) = provider();

        // No configuration-change notification has fired yet.
        let result = provider.resolve_bool("enabledFeature", false, None);
        assert!(result.value);

        // A notification replaces the held snapshot wholesale.
        let mut changed = settings();
        changed.insert(
            "enabledFeature".to_owned(),
            TestSetting::new(TestValue::Bool(false)).with_variation_id("v-disabled"),
        );
        engine.push_snapshot(changed, ConfigState::HasUpToDateFlagData);

        let result = provider.resolve_bool("enabledFeature", true, None);
        assert!(!result.value);
        assert_eq!(result.variant, Some("v-disabled".into()));
    }

    #[tokio::test]
    async fn readiness_fires_exactly_once_across_repeated_notifications() {
        let (engine, provider) = provider();
        let mut stream = provider.observe();

        engine.push_snapshot(settings(), ConfigState::HasUpToDateFlagData);
        engine.push_snapshot(settings(), ConfigState::HasUpToDateFlagData);
        engine.push_snapshot(settings(), ConfigState::HasUpToDateFlagData);

        assert_eq!(stream.next().await, Some(ProviderEvent::Ready));
        let second = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
        assert!(second.is_err(), "expected exactly one ready event");
    }

    #[tokio::test]
    async fn late_subscriber_still_observes_the_ready_event() {
        let (engine, provider) = provider();

        engine.push_snapshot(settings(), ConfigState::HasUpToDateFlagData);

        let mut stream = provider.observe();
        assert_eq!(stream.next().await, Some(ProviderEvent::Ready));
    }

    #[tokio::test]
    async fn no_flag_data_notifications_never_fire_readiness() {
        let (engine, provider) = provider();
        let mut stream = provider.observe();

        engine.push_snapshot(settings(), ConfigState::NoFlagData);

        let event = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
        assert!(event.is_err(), "no-data notification must not fire readiness");
    }

    #[tokio::test]
    async fn initialize_emits_ready_when_the_engine_reports_data() {
        let (_engine, provider) = provider();
        let mut stream = provider.observe();

        provider.initialize(None).await.unwrap();

        assert_eq!(stream.next().await, Some(ProviderEvent::Ready));
    }

    #[tokio::test]
    async fn initialize_times_out_when_the_engine_never_reports() {
        let engine = Arc::new(TestEngine::unready(settings()));
        let provider = EngineProvider::with_options(
            Arc::clone(&engine) as Arc<dyn crate::engine::FlagEngine>,
            ProviderOptions::new().with_ready_timeout(Duration::from_millis(20)),
        );

        let result = provider.initialize(None).await;

        assert_eq!(result, Err(Error::ReadyTimeout));
    }

    #[test]
    fn shutdown_releases_the_engine() {
        let (engine, provider) = provider();

        provider.shutdown();

        assert!(engine.is_closed());
    }
}
