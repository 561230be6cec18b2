use std::time::{Duration, Instant};

use rescaler_image::{estimate_rgba_bytes, DimensionError, DimensionValue, Dimensions, ReducedRatio, AREA_LIMIT, MAX_AREA_LIMIT};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RescalePolicy {
    pub area_limit: u64,
    /// When false, images already within `area_limit` are returned untouched
    /// instead of being scaled up toward the limit.
    pub allow_upscale: bool,
}

impl Default for RescalePolicy {
    fn default() -> Self {
        Self {
            area_limit: AREA_LIMIT,
            allow_upscale: true,
        }
    }
}

impl RescalePolicy {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.area_limit == 0 {
            return Err(CoreError::InvalidPolicy("area limit must be positive".to_string()));
        }
        if self.area_limit > MAX_AREA_LIMIT {
            return Err(CoreError::InvalidPolicy(format!("area limit must not exceed {}", MAX_AREA_LIMIT)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyOverrides {
    pub area_limit: Option<u64>,
    pub allow_upscale: Option<bool>,
}

pub fn resolve_policy(overrides: PolicyOverrides) -> RescalePolicy {
    let mut policy = RescalePolicy::default();
    if let Some(area_limit) = overrides.area_limit {
        policy.area_limit = area_limit;
    }
    if let Some(allow_upscale) = overrides.allow_upscale {
        policy.allow_upscale = allow_upscale;
    }
    policy
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RescaleRequest {
    pub height: DimensionValue,
    pub width: DimensionValue,
}

impl RescaleRequest {
    pub fn new(height: impl Into<DimensionValue>, width: impl Into<DimensionValue>) -> Self {
        Self {
            height: height.into(),
            width: width.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RescaleResult {
    pub original: Dimensions,
    pub rescaled: Dimensions,
    pub ratio: ReducedRatio,
    pub original_area: u64,
    pub rescaled_area: u64,
    pub rescale_applied: bool,
    pub estimated_rgba_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TelemetryEventType {
    RescaleStart,
    RescaleSuccess,
    RescaleError,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub event_type: TelemetryEventType,
    pub original: Option<Dimensions>,
    pub rescaled: Option<Dimensions>,
    pub duration_us: Option<u64>,
    pub detail: Option<String>,
}

pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: TelemetryEvent);
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Dimension(#[from] DimensionError),
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    InvalidDimension,
    DivisionUndefined,
    LimitOutOfRange,
    InvalidPolicy,
    InvalidRequest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
}

impl CoreError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Dimension(DimensionError::InvalidDimension { .. }) => ErrorCode::InvalidDimension,
            Self::Dimension(DimensionError::DivisionUndefined) => ErrorCode::DivisionUndefined,
            Self::Dimension(DimensionError::LimitOutOfRange { .. }) => ErrorCode::LimitOutOfRange,
            Self::InvalidPolicy(_) => ErrorCode::InvalidPolicy,
            Self::InvalidRequest(_) => ErrorCode::InvalidRequest,
        }
    }

    pub fn as_error_info(&self) -> ErrorInfo {
        ErrorInfo {
            code: self.code(),
            message: self.to_string(),
        }
    }
}

pub mod v1 {
    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct RescaleRequest {
        pub height: DimensionValue,
        pub width: DimensionValue,
        pub area_limit: Option<u64>,
        pub allow_upscale: Option<bool>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct RescaleResponse {
        pub height: u32,
        pub width: u32,
        pub original_height: u32,
        pub original_width: u32,
        pub ratio: ReducedRatio,
        pub area: u64,
        pub original_area: u64,
        pub rescale_applied: bool,
    }

    impl From<RescaleResult> for RescaleResponse {
        fn from(result: RescaleResult) -> Self {
            Self {
                height: result.rescaled.height,
                width: result.rescaled.width,
                original_height: result.original.height,
                original_width: result.original.width,
                ratio: result.ratio,
                area: result.rescaled_area,
                original_area: result.original_area,
                rescale_applied: result.rescale_applied,
            }
        }
    }
}

pub fn run_rescale(request: &RescaleRequest, policy: &RescalePolicy) -> Result<RescaleResult, CoreError> {
    run_rescale_with_telemetry(request, policy, None)
}

#[tracing::instrument(level = "debug", skip(telemetry))]
pub fn run_rescale_with_telemetry(
    request: &RescaleRequest,
    policy: &RescalePolicy,
    telemetry: Option<&dyn TelemetrySink>,
) -> Result<RescaleResult, CoreError> {
    let start = Instant::now();
    if let Some(sink) = telemetry {
        sink.emit(TelemetryEvent {
            event_type: TelemetryEventType::RescaleStart,
            original: None,
            rescaled: None,
            duration_us: None,
            detail: Some(format!("height={},width={}", request.height, request.width)),
        });
    }
    match apply_policy(request, policy) {
        Ok(result) => {
            tracing::debug!(
                original = %result.original,
                rescaled = %result.rescaled,
                ratio = %result.ratio,
                applied = result.rescale_applied,
                "rescale finished"
            );
            if let Some(sink) = telemetry {
                sink.emit(TelemetryEvent {
                    event_type: TelemetryEventType::RescaleSuccess,
                    original: Some(result.original),
                    rescaled: Some(result.rescaled),
                    duration_us: Some(duration_micros(start.elapsed())),
                    detail: Some(format!("ratio={},applied={}", result.ratio, result.rescale_applied)),
                });
            }
            Ok(result)
        }
        Err(err) => {
            if let Some(sink) = telemetry {
                sink.emit(TelemetryEvent {
                    event_type: TelemetryEventType::RescaleError,
                    original: None,
                    rescaled: None,
                    duration_us: Some(duration_micros(start.elapsed())),
                    detail: Some(err.to_string()),
                });
            }
            Err(err)
        }
    }
}

fn duration_micros(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX)
}

fn apply_policy(request: &RescaleRequest, policy: &RescalePolicy) -> Result<RescaleResult, CoreError> {
    policy.validate()?;
    let original = Dimensions::parse(request.height.clone(), request.width.clone())?;
    let ratio = original.ratio()?;
    let rescale_applied = policy.allow_upscale || original.needs_rescale(policy.area_limit);
    let rescaled = if rescale_applied {
        original.rescale_to(policy.area_limit)?
    } else {
        original
    };
    Ok(RescaleResult {
        original,
        rescaled,
        ratio,
        original_area: original.area(),
        rescaled_area: rescaled.area(),
        rescale_applied,
        estimated_rgba_bytes: estimate_rgba_bytes(&rescaled),
    })
}

pub fn rescale_v1(request: v1::RescaleRequest, telemetry: Option<&dyn TelemetrySink>) -> Result<v1::RescaleResponse, CoreError> {
    let policy = resolve_policy(PolicyOverrides {
        area_limit: request.area_limit,
        allow_upscale: request.allow_upscale,
    });
    let request = RescaleRequest {
        height: request.height,
        width: request.width,
    };
    run_rescale_with_telemetry(&request, &policy, telemetry).map(v1::RescaleResponse::from)
}

/// JSON in, JSON out: either a `v1::RescaleResponse` or an `ErrorInfo` object.
pub fn rescale_v1_json(request_json: &str) -> String {
    let outcome = serde_json::from_str::<v1::RescaleRequest>(request_json)
        .map_err(|err| CoreError::InvalidRequest(err.to_string()))
        .and_then(|request| rescale_v1(request, None));
    let encoded = match outcome {
        Ok(response) => serde_json::to_string(&response),
        Err(err) => serde_json::to_string(&err.as_error_info()),
    };
    encoded.unwrap_or_else(|_| "{\"code\":\"invalid-request\",\"message\":\"response encode failed\"}".to_string())
}
