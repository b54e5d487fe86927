//! The `utils` module holds the pieces shared by every other module:
//! the error type and the logging bootstrap.

pub mod error;
pub mod logging;

#[cfg(test)]
mod tests {
    use super::error::SubscriptionError;
    use super::logging;

    #[test]
    fn logging_init_accepts_levels() {
        logging::init("info");
        logging::init("debug");
        logging::init("warn");
        logging::init("nonsense");
        logging::init("[unclosed");
    }

    #[test]
    fn errors_render_with_their_labels() {
        let err = SubscriptionError::InvalidTopic {
            topic: "\"a b\"".to_string(),
            reason: "whitespace".to_string(),
        };
        assert_eq!(err.to_string(), "invalid topic \"a b\": whitespace");
        assert_eq!(err.as_label(), "invalid_topic");

        let err = SubscriptionError::InvalidListener {
            listener: "ListenerRef(0x10)".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid listener ListenerRef(0x10): dropped before subscribing"
        );
        assert_eq!(err.as_label(), "invalid_listener");
    }
}
