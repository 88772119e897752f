//! Record body transforms applied by the worker pool

use super::source::TransformError;

/// A pure, single-record body transform.
///
/// Implementations must not touch shared state: a worker may abandon a call
/// during cancellation and its result is simply dropped.
pub trait TextTransform: Send + Sync {
    fn apply(&self, body: &str) -> Result<String, TransformError>;
}

/// Passes bodies through unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl TextTransform for Identity {
    fn apply(&self, body: &str) -> Result<String, TransformError> {
        Ok(body.to_string())
    }
}

/// Adapter turning a closure into a [`TextTransform`]
#[derive(Debug, Clone, Copy)]
pub struct FnTransform<F>(F);

impl<F> TextTransform for FnTransform<F>
where
    F: Fn(&str) -> Result<String, TransformError> + Send + Sync,
{
    fn apply(&self, body: &str) -> Result<String, TransformError> {
        (self.0)(body)
    }
}

/// Wrap a closure as a transform
pub fn from_fn<F>(f: F) -> FnTransform<F>
where
    F: Fn(&str) -> Result<String, TransformError> + Send + Sync,
{
    FnTransform(f)
}
