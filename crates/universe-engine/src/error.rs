//! Engine error taxonomy.
//!
//! Every error here is synchronous and reported to the immediate caller.
//! Nothing inside the engine retries on any of them.

use thiserror::Error;

/// Errors surfaced by the engine core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    /// An operation was called in the wrong protocol state
    /// (`submit` before `begin`, `put` on a mapped buffer, ...).
    #[error("{resource}: {reason}")]
    UsageState { resource: String, reason: String },

    /// A requested growth does not fit in the representable element range.
    #[error("{resource}: requested capacity {requested} exceeds the maximum of {max}")]
    Capacity {
        resource: String,
        requested: usize,
        max: usize,
    },

    /// Conflicting attribute registration or vertex/fill mismatch.
    #[error("{resource}: {reason}")]
    ConfigurationMismatch { resource: String, reason: String },

    /// Use of a disposed resource, a stale handle, or a node without a display.
    #[error("{resource} is not usable: {reason}")]
    ResourceState { resource: String, reason: String },

    /// Backend failure reported by the graphics device.
    #[error("device error: {0}")]
    Device(String),
}

impl RenderError {
    pub fn usage(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UsageState {
            resource: resource.into(),
            reason: reason.into(),
        }
    }

    pub fn mismatch(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigurationMismatch {
            resource: resource.into(),
            reason: reason.into(),
        }
    }

    pub fn resource(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ResourceState {
            resource: resource.into(),
            reason: reason.into(),
        }
    }

    pub fn capacity(resource: impl Into<String>, requested: usize, max: usize) -> Self {
        Self::Capacity {
            resource: resource.into(),
            requested,
            max,
        }
    }

    /// True for errors after which the device cannot continue rendering.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Device(_))
    }
}

pub type Result<T, E = RenderError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_resource() {
        let e = RenderError::usage("batch renderer", "submit called while idle");
        assert_eq!(e.to_string(), "batch renderer: submit called while idle");

        let e = RenderError::capacity("vertex buffer #3", 10, 4);
        assert!(e.to_string().contains("vertex buffer #3"));
        assert!(e.to_string().contains("10"));
    }

    #[test]
    fn only_device_errors_are_fatal() {
        assert!(RenderError::Device("lost".into()).is_fatal());
        assert!(!RenderError::resource("texture #1", "disposed").is_fatal());
    }
}
