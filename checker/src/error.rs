/// Marker for an error that has already been reported to the error queue.
/// Carrying it in a `Result` tells callers compilation cannot continue
/// without duplicating the diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportedError;

pub type CompileResult<T> = Result<T, ReportedError>;
