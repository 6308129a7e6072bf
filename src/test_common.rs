//! In-memory engine double shared across tests.
//!
//! Serves canned per-key details and records the user each evaluation was
//! given; it performs no rule matching.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;

use crate::engine::{
    ConfigChangedHook, ConfigState, EngineSnapshot, EvaluationDetails, EvaluationErrorCode,
    FlagEngine,
};
use crate::user::EngineUser;
use crate::Str;

#[derive(Debug, Clone)]
pub(crate) enum TestValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

#[derive(Debug, Clone)]
pub(crate) struct TestSetting {
    value: TestValue,
    variation_id: Option<Str>,
    matched_targeting_rule: bool,
}

impl TestSetting {
    pub(crate) fn new(value: TestValue) -> TestSetting {
        TestSetting {
            value,
            variation_id: None,
            matched_targeting_rule: false,
        }
    }

    pub(crate) fn with_variation_id(mut self, variation_id: impl Into<Str>) -> TestSetting {
        self.variation_id = Some(variation_id.into());
        self
    }

    pub(crate) fn matched_by_targeting(mut self) -> TestSetting {
        self.matched_targeting_rule = true;
        self
    }
}

type SeenUser = Option<EngineUser>;

pub(crate) struct TestEngine {
    snapshot: RwLock<Arc<TestSnapshot>>,
    hooks: Mutex<Vec<ConfigChangedHook>>,
    /// `None` makes `wait_for_ready` suspend forever.
    ready_state: Option<ConfigState>,
    last_user: Arc<Mutex<Option<SeenUser>>>,
    closed: AtomicBool,
}

impl TestEngine {
    pub(crate) fn new(settings: HashMap<String, TestSetting>) -> TestEngine {
        TestEngine::with_ready_state(settings, Some(ConfigState::HasUpToDateFlagData))
    }

    /// An engine whose `wait_for_ready` never completes.
    pub(crate) fn unready(settings: HashMap<String, TestSetting>) -> TestEngine {
        TestEngine::with_ready_state(settings, None)
    }

    fn with_ready_state(
        settings: HashMap<String, TestSetting>,
        ready_state: Option<ConfigState>,
    ) -> TestEngine {
        let last_user = Arc::new(Mutex::new(None));
        let snapshot = TestSnapshot {
            settings,
            state: ConfigState::HasUpToDateFlagData,
            last_user: Arc::clone(&last_user),
        };
        TestEngine {
            snapshot: RwLock::new(Arc::new(snapshot)),
            hooks: Mutex::new(Vec::new()),
            ready_state,
            last_user,
            closed: AtomicBool::new(false),
        }
    }

    /// Install a new snapshot and run the registered configuration-change
    /// hooks, as the engine's polling would.
    pub(crate) fn push_snapshot(
        &self,
        settings: HashMap<String, TestSetting>,
        state: ConfigState,
    ) {
        let snapshot = Arc::new(TestSnapshot {
            settings,
            state,
            last_user: Arc::clone(&self.last_user),
        });
        *self.snapshot.write().unwrap() = Arc::clone(&snapshot);
        for hook in self.hooks.lock().unwrap().iter() {
            hook(Arc::clone(&snapshot) as Arc<dyn EngineSnapshot>);
        }
    }

    /// The user passed to the most recent evaluation: `None` if nothing was
    /// evaluated yet, `Some(None)` for an evaluation without a user.
    pub(crate) fn last_user(&self) -> Option<SeenUser> {
        self.last_user.lock().unwrap().clone()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FlagEngine for TestEngine {
    fn snapshot(&self) -> Arc<dyn EngineSnapshot> {
        let snapshot = self.snapshot.read().unwrap().clone();
        snapshot
    }

    async fn wait_for_ready(&self) -> ConfigState {
        match self.ready_state {
            Some(state) => state,
            None => std::future::pending().await,
        }
    }

    fn on_config_changed(&self, hook: ConfigChangedHook) {
        self.hooks.lock().unwrap().push(hook);
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub(crate) struct TestSnapshot {
    settings: HashMap<String, TestSetting>,
    state: ConfigState,
    last_user: Arc<Mutex<Option<SeenUser>>>,
}

impl TestSnapshot {
    fn details<T>(
        &self,
        key: &str,
        default: T,
        expected: &str,
        user: Option<&EngineUser>,
        extract: impl Fn(&TestValue) -> Option<T>,
    ) -> EvaluationDetails<T> {
        *self.last_user.lock().unwrap() = Some(user.cloned());

        let Some(setting) = self.settings.get(key) else {
            return EvaluationDetails::failed(
                default,
                EvaluationErrorCode::SettingKeyMissing,
                format!("Failed to evaluate setting '{key}' (the key was not found)"),
            );
        };
        match extract(&setting.value) {
            Some(value) => {
                let mut details = EvaluationDetails::resolved(value);
                details.variation_id = setting.variation_id.clone();
                details.matched_targeting_rule = setting.matched_targeting_rule;
                details
            }
            None => EvaluationDetails::failed(
                default,
                EvaluationErrorCode::SettingValueTypeMismatch,
                format!("The setting '{key}' is not of type {expected}"),
            ),
        }
    }
}

impl EngineSnapshot for TestSnapshot {
    fn config_state(&self) -> ConfigState {
        self.state
    }

    fn bool_details(
        &self,
        key: &str,
        default: bool,
        user: Option<&EngineUser>,
    ) -> EvaluationDetails<bool> {
        self.details(key, default, "bool", user, |value| match value {
            TestValue::Bool(b) => Some(*b),
            _ => None,
        })
    }

    fn int_details(
        &self,
        key: &str,
        default: i64,
        user: Option<&EngineUser>,
    ) -> EvaluationDetails<i64> {
        self.details(key, default, "int", user, |value| match value {
            TestValue::Int(i) => Some(*i),
            _ => None,
        })
    }

    fn float_details(
        &self,
        key: &str,
        default: f64,
        user: Option<&EngineUser>,
    ) -> EvaluationDetails<f64> {
        self.details(key, default, "float", user, |value| match value {
            TestValue::Float(f) => Some(*f),
            _ => None,
        })
    }

    fn string_details(
        &self,
        key: &str,
        default: String,
        user: Option<&EngineUser>,
    ) -> EvaluationDetails<String> {
        self.details(key, default, "string", user, |value| match value {
            TestValue::String(s) => Some(s.clone()),
            _ => None,
        })
    }
}
