/// An event handed to the presentation sink.
///
/// Events are:
/// - **immutable** (snapshots, not live views)
/// - **named** with a stable dotted identifier
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier (e.g. "inventory.summary_updated").
    fn event_type(&self) -> &'static str;
}
