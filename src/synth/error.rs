use thiserror::Error;
#[derive(Debug, Error)]
pub enum ScopeError {
    #[error("`{0}` is not a number")]
    InvalidEntry(String),
    #[error("{field} out of range: {value} (allowed {min}..={max})")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("{field} must be a whole number, got {value}")]
    NotWholeNumber { field: &'static str, value: f64 },
    #[error("no harmonic with id {0}")]
    UnknownHarmonic(u32),
    #[error("all {0} harmonic slots are in use")]
    HarmonicSlotsFull(usize),
    #[error("no phase at index {0}")]
    UnknownPhase(usize),
    #[error("phase {0} has no {1} channel data")]
    ChannelUnavailable(usize, &'static str),
    #[error("settings store failed: {0}")]
    Store(#[from] std::io::Error),
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("failed to render plot: {0}")]
    Plot(String),
}
impl<E: std::error::Error + Send + Sync + 'static> From<plotters::drawing::DrawingAreaErrorKind<E>>
    for ScopeError
{
    fn from(value: plotters::drawing::DrawingAreaErrorKind<E>) -> Self {
        ScopeError::Plot(format!("{value:?}"))
    }
}
impl From<image::ImageError> for ScopeError {
    fn from(value: image::ImageError) -> Self {
        ScopeError::Plot(value.to_string())
    }
}
