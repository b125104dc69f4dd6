//! Response DSL bound into scripts as `respond`

use parking_lot::RwLock;
use rhai::{Dynamic, Engine, EvalAltResult, INT};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Name of the result binding
pub const DSL_VAR_NAME: &str = "respond";

type DslResult = Result<ResponseDsl, Box<EvalAltResult>>;

/// Whether the default response processing still runs after the script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseBehaviourType {
    /// Continue with the default behaviour
    #[default]
    DefaultBehaviour,
    /// Respond immediately with what the script configured
    ShortCircuit,
}

/// Simulated failure instead of a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureSimulationType {
    /// Send no response body at all
    EmptyResponse,
    /// Close the connection without responding
    CloseConnection,
}

impl FromStr for FailureSimulationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "").as_str() {
            "emptyresponse" => Ok(Self::EmptyResponse),
            "closeconnection" => Ok(Self::CloseConnection),
            _ => Err(format!("unknown failure type: {s}")),
        }
    }
}

/// Simulated latency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSimulation {
    /// Fixed delay
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exact_delay_ms: Option<u64>,
    /// Lower bound of a random delay
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_delay_ms: Option<u64>,
    /// Upper bound of a random delay
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_delay_ms: Option<u64>,
}

/// Response configured by a script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseBehaviour {
    /// Default or short-circuit
    pub behaviour_type: ResponseBehaviourType,
    /// HTTP status code
    pub status_code: u16,
    /// Response headers
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Inline response body
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// File to serve as the body
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_file: Option<String>,
    /// Named example from the API specification
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example_name: Option<String>,
    /// Latency simulation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance: Option<PerformanceSimulation>,
    /// Failure simulation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_type: Option<FailureSimulationType>,
}

impl Default for ResponseBehaviour {
    fn default() -> Self {
        Self {
            behaviour_type: ResponseBehaviourType::DefaultBehaviour,
            status_code: 200,
            headers: BTreeMap::new(),
            content: None,
            response_file: None,
            example_name: None,
            performance: None,
            failure_type: None,
        }
    }
}

/// Builder a script uses to configure its response
///
/// Clones share state, so chained calls in the script all write to the same
/// behaviour the host reads afterwards.
#[derive(Clone, Default)]
pub struct ResponseDsl {
    behaviour: Arc<RwLock<ResponseBehaviour>>,
}

impl fmt::Debug for ResponseDsl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ResponseDsl")
            .field(&*self.behaviour.read())
            .finish()
    }
}

impl ResponseDsl {
    /// Create a DSL holding the default behaviour
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the configured behaviour
    pub fn response_behaviour(&self) -> ResponseBehaviour {
        self.behaviour.read().clone()
    }

    fn update(&self, f: impl FnOnce(&mut ResponseBehaviour)) -> ResponseDsl {
        f(&mut *self.behaviour.write());
        self.clone()
    }

    /// Set the status code
    pub fn with_status_code(&self, code: INT) -> DslResult {
        let code = u16::try_from(code)
            .ok()
            .filter(|c| (100..=999).contains(c))
            .ok_or_else(|| format!("invalid status code: {code}"))?;
        Ok(self.update(|b| b.status_code = code))
    }

    /// Add a response header
    pub fn with_header(&self, name: &str, value: Dynamic) -> ResponseDsl {
        let value = value.to_string();
        self.update(|b| {
            b.headers.insert(name.to_string(), value);
        })
    }

    /// Set the inline body
    pub fn with_content(&self, content: Dynamic) -> ResponseDsl {
        let content = if content.is_string() {
            content.to_string()
        } else {
            serde_json::to_string(&content).unwrap_or_else(|_| content.to_string())
        };
        self.update(|b| b.content = Some(content))
    }

    /// Serve a file as the body
    pub fn with_file(&self, path: &str) -> ResponseDsl {
        self.update(|b| b.response_file = Some(path.to_string()))
    }

    /// Respond with an empty body
    pub fn with_empty(&self) -> ResponseDsl {
        self.update(|b| {
            b.content = Some(String::new());
            b.response_file = None;
        })
    }

    /// Select a named example
    pub fn with_example_name(&self, name: &str) -> ResponseDsl {
        self.update(|b| b.example_name = Some(name.to_string()))
    }

    /// Continue with default processing
    pub fn using_default_behaviour(&self) -> ResponseDsl {
        self.update(|b| b.behaviour_type = ResponseBehaviourType::DefaultBehaviour)
    }

    /// Respond with exactly what the script configured
    pub fn skip_default_behaviour(&self) -> ResponseDsl {
        self.update(|b| b.behaviour_type = ResponseBehaviourType::ShortCircuit)
    }

    /// Fixed response delay
    pub fn with_delay(&self, millis: INT) -> DslResult {
        let millis = non_negative(millis)?;
        Ok(self.update(|b| {
            b.performance = Some(PerformanceSimulation {
                exact_delay_ms: Some(millis),
                ..PerformanceSimulation::default()
            })
        }))
    }

    /// Random response delay between two bounds
    pub fn with_delay_range(&self, min: INT, max: INT) -> DslResult {
        let (min, max) = (non_negative(min)?, non_negative(max)?);
        if min > max {
            return Err(format!("invalid delay range: {min} > {max}").into());
        }
        Ok(self.update(|b| {
            b.performance = Some(PerformanceSimulation {
                exact_delay_ms: None,
                min_delay_ms: Some(min),
                max_delay_ms: Some(max),
            })
        }))
    }

    /// Simulate a failure instead of responding
    pub fn with_failure(&self, failure: &str) -> DslResult {
        let failure: FailureSimulationType = failure.parse()?;
        Ok(self.update(|b| b.failure_type = Some(failure)))
    }

    /// Behaviour as a script value
    pub fn behaviour_value(&self) -> Result<Dynamic, Box<EvalAltResult>> {
        rhai::serde::to_dynamic(self.response_behaviour())
    }
}

fn non_negative(millis: INT) -> Result<u64, Box<EvalAltResult>> {
    u64::try_from(millis).map_err(|_| format!("delay must not be negative: {millis}").into())
}

pub(crate) fn register(engine: &mut Engine) {
    engine
        .register_type_with_name::<ResponseDsl>("ResponseDsl")
        .register_fn("withStatusCode", |dsl: &mut ResponseDsl, code: INT| {
            dsl.with_status_code(code)
        })
        .register_fn(
            "withHeader",
            |dsl: &mut ResponseDsl, name: &str, value: Dynamic| dsl.with_header(name, value),
        )
        .register_fn("withContent", |dsl: &mut ResponseDsl, content: Dynamic| {
            dsl.with_content(content)
        })
        .register_fn("withData", |dsl: &mut ResponseDsl, content: Dynamic| {
            dsl.with_content(content)
        })
        .register_fn("withFile", |dsl: &mut ResponseDsl, path: &str| {
            dsl.with_file(path)
        })
        .register_fn("withEmpty", |dsl: &mut ResponseDsl| dsl.with_empty())
        .register_fn("withExampleName", |dsl: &mut ResponseDsl, name: &str| {
            dsl.with_example_name(name)
        })
        .register_fn("usingDefaultBehaviour", |dsl: &mut ResponseDsl| {
            dsl.using_default_behaviour()
        })
        .register_fn("continueToNext", |dsl: &mut ResponseDsl| {
            dsl.using_default_behaviour()
        })
        .register_fn("skipDefaultBehaviour", |dsl: &mut ResponseDsl| {
            dsl.skip_default_behaviour()
        })
        .register_fn("withDelay", |dsl: &mut ResponseDsl, millis: INT| {
            dsl.with_delay(millis)
        })
        .register_fn(
            "withDelayRange",
            |dsl: &mut ResponseDsl, min: INT, max: INT| dsl.with_delay_range(min, max),
        )
        .register_fn("withFailure", |dsl: &mut ResponseDsl, failure: &str| {
            dsl.with_failure(failure)
        })
        .register_fn("and", |dsl: &mut ResponseDsl| dsl.clone())
        .register_get("responseBehaviour", |dsl: &mut ResponseDsl| {
            dsl.behaviour_value()
        });
}
