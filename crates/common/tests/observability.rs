use metrics_exporter_prometheus::PrometheusBuilder;

// Integration test: exercises the public `common::observability` surface.

#[test]
fn error_events_increment_counter_with_json_logs() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    metrics::with_local_recorder(&recorder, || {
        let (dispatch, otel_guard) =
            common::observability::build_dispatch("test-service", "info", true);
        assert!(otel_guard.is_none() || std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok());

        tracing::dispatcher::with_default(&dispatch, || {
            tracing::error!(bot_id = 7, "wallet reveal failed");
        });
    });

    let rendered = handle.render();
    assert!(
        rendered.contains("botfeed_tracing_error_events"),
        "expected botfeed_tracing_error_events in rendered metrics, got:\n{rendered}"
    );
}

#[test]
fn warn_events_do_not_count_as_errors() {
    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();

    metrics::with_local_recorder(&recorder, || {
        let (dispatch, _otel_guard) =
            common::observability::build_dispatch("test-service", "info", false);
        tracing::dispatcher::with_default(&dispatch, || {
            tracing::warn!("dangling bot reference");
        });
    });

    assert!(!handle.render().contains("botfeed_tracing_error_events"));
}
