use tracing::Span;

pub fn adapter_session_span(adapter: &str) -> Span {
    tracing::info_span!(
        "adapter_session",
        adapter = adapter,
    )
}

pub fn fallback_poll_span() -> Span {
    tracing::info_span!("fallback_poll")
}
