//! Transcript interception on the upstream -> client direction

use std::sync::Arc;

use super::protocol::{Event, Frame, Transcript};
use super::throttle::Throttle;
use crate::logger::log;
use crate::rules::{normalize_basic, RuleEngine, RuleSet};

/// What happened to one decoded transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RewriteOutcome {
    /// Forward the original event
    Unchanged,
    /// Within the throttle interval, forward the original event
    Throttled,
    /// No rule matched but normalization changed the text
    Normalized(String),
    /// A rule matched
    Rewritten(String),
}

/// Rewrites transcript events using the shared rule engine
pub struct TranscriptInterceptor {
    engine: Arc<RuleEngine>,
    throttle: Option<Arc<Throttle>>,
}

impl TranscriptInterceptor {
    pub fn new(engine: Arc<RuleEngine>, throttle: Option<Arc<Throttle>>) -> Self {
        Self { engine, throttle }
    }

    /// Decide the fate of one transcript text against a rule snapshot
    pub fn decide(&self, rules: &RuleSet, original: &str) -> RewriteOutcome {
        let fixed = rules.apply(original);

        if let Some(throttle) = &self.throttle {
            if !throttle.try_acquire() {
                return RewriteOutcome::Throttled;
            }
        }

        if fixed != normalize_basic(original) {
            RewriteOutcome::Rewritten(fixed)
        } else if fixed != original {
            RewriteOutcome::Normalized(fixed)
        } else {
            RewriteOutcome::Unchanged
        }
    }

    /// Process one frame read from upstream, returning the frame to forward
    pub async fn intercept(&self, frame: Frame) -> Frame {
        let (transcript, frame) = match Event::from_frame(frame) {
            (Event::Passthrough(frame), None) => return frame,
            (Event::Passthrough(frame), Some(e)) => {
                log::debug!(error = %e, "Transcript decode failed, passing through");
                return frame;
            }
            (Event::Transcript(transcript, frame), _) => (transcript, frame),
        };

        let rules = self.engine.reload_if_changed().await;
        match self.decide(&rules, &transcript.text) {
            RewriteOutcome::Unchanged => frame,
            RewriteOutcome::Throttled => {
                log::debug!(text = %transcript.text, "Transcript throttled, passing through");
                frame
            }
            RewriteOutcome::Normalized(fixed) => {
                log::transcript("normalize", &transcript.text, &fixed);
                replace(&transcript, &fixed, frame)
            }
            RewriteOutcome::Rewritten(fixed) => {
                log::transcript("rewrite", &transcript.text, &fixed);
                replace(&transcript, &fixed, frame)
            }
        }
    }
}

/// Build the substitute frame, falling back to the original if encoding fails
fn replace(transcript: &Transcript, fixed: &str, original: Frame) -> Frame {
    match transcript.to_frame(fixed) {
        Ok(frame) => frame,
        Err(e) => {
            log::warn!(error = %e, "Failed to encode rewritten transcript, forwarding original");
            original
        }
    }
}
