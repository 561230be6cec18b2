use anyhow::{anyhow, Result};
use rescaler_core::{
    rescale_v1, run_rescale_with_telemetry, v1, ErrorCode, RescalePolicy, RescaleRequest, TelemetryEventType,
    TelemetrySink,
};
use rescaler_image::{greatest_common_divisor, DimensionError, Dimensions, ReducedRatio, AREA_LIMIT};
use rescaler_telemetry::{MemorySink, TracingSink};
use smoke_tests::init_tracing;

#[test]
fn reference_ratios() -> Result<()> {
    init_tracing();
    let cases = [
        (20, 30, 2, 3, 10),
        (640, 480, 4, 3, 160),
        (1024, 1200, 64, 75, 16),
        (1920, 1200, 8, 5, 240),
        (1920, 1024, 15, 8, 128),
        (3840, 2560, 3, 2, 1280),
    ];
    for (height, width, h, w, divider) in cases {
        let ratio = Dimensions::new(height, width).ratio()?;
        assert_eq!(ratio, ReducedRatio { height: h, width: w, divider });
        assert_eq!(greatest_common_divisor(i64::from(h), i64::from(w)), 1);
    }
    Ok(())
}

#[test]
fn reference_areas_rescale_within_limit() -> Result<()> {
    init_tracing();
    let cases = [
        (10, 20, 200),
        (500, 20, 10_000),
        (1000, 2000, 2_000_000),
        (1024, 1920, 1_966_080),
        (3840, 2400, 9_216_000),
        (1234, 6543, 8_074_062),
        (7899, 123, 971_577),
    ];
    for (height, width, area) in cases {
        let original = Dimensions::new(height, width);
        assert_eq!(original.area(), area);
        let rescaled = original.rescale()?;
        assert!(rescaled.area() <= AREA_LIMIT, "{original} rescaled to {rescaled}");
    }
    Ok(())
}

#[test]
fn big_areas_shrink_to_reference_sizes() -> Result<()> {
    init_tracing();
    let cases = [
        (5000, 4000, 2236, 1788),
        (15800, 14500, 2087, 1915),
        (8_000_000, 4000, 89442, 44),
    ];
    for (height, width, new_height, new_width) in cases {
        let original = Dimensions::new(height, width);
        assert!(original.exceeds_limit());
        let rescaled = original.rescale()?;
        assert!(rescaled.area() <= AREA_LIMIT);
        assert_ne!(original.height, rescaled.height);
        assert_ne!(original.width, rescaled.width);
        assert_eq!(rescaled, Dimensions::new(new_height, new_width));
    }
    Ok(())
}

#[test]
fn construction_truncates_and_rejects() -> Result<()> {
    let dims = Dimensions::parse("123.5", 23.5656)?;
    assert_eq!((dims.height, dims.width), (123, 23));
    match Dimensions::parse("abc", 10) {
        Err(DimensionError::InvalidDimension { input, .. }) => assert_eq!(input, "abc"),
        other => return Err(anyhow!("expected InvalidDimension, got {other:?}")),
    }
    Ok(())
}

#[test]
fn cloned_dimensions_are_independent() {
    let source = Dimensions::new(200, 300);
    let mut copy = source.clone();
    assert_eq!(source, copy);
    copy.width = 1;
    assert_eq!(source.width, 300);
}

#[test]
fn pipeline_reports_telemetry() -> Result<()> {
    init_tracing();
    let sink = MemorySink::default();
    let memory: Option<&dyn TelemetrySink> = Some(&sink);
    let result = run_rescale_with_telemetry(&RescaleRequest::new("15800", 14500.9), &RescalePolicy::default(), memory)?;
    assert_eq!(result.rescaled, Dimensions::new(2087, 1915));
    assert_eq!(result.original_area, 229_100_000);

    let logged: Option<&dyn TelemetrySink> = Some(&TracingSink);
    let err = run_rescale_with_telemetry(&RescaleRequest::new(0, 0), &RescalePolicy::default(), logged)
        .expect_err("0x0 has no ratio");
    assert_eq!(err.code(), ErrorCode::DivisionUndefined);

    let events: Vec<_> = sink.events().into_iter().map(|event| event.event_type).collect();
    assert_eq!(events, vec![TelemetryEventType::RescaleStart, TelemetryEventType::RescaleSuccess]);
    Ok(())
}

#[test]
fn v1_contract_round_trips_through_json() -> Result<()> {
    let request: v1::RescaleRequest = serde_json::from_str(r#"{"height":3840,"width":"2400","areaLimit":1000000}"#)?;
    let response = rescale_v1(request, None)?;
    assert_eq!(response.original_area, 9_216_000);
    assert!(response.area <= 1_000_000);
    assert_eq!(response.ratio, ReducedRatio { height: 8, width: 5, divider: 480 });

    let value = serde_json::to_value(&response)?;
    assert!(value.get("originalHeight").is_some());
    assert!(value.get("rescaleApplied").is_some());
    Ok(())
}
