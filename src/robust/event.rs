/// Estimation lifecycle [Event]s, delivered synchronously to the listener.
/// Ordering is guaranteed: [Event::Start], then interleaved [Event::Iteration]
/// and [Event::Progress], then [Event::End].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    /// Estimation started
    Start,
    /// Number of subsets processed so far
    Iteration(usize),
    /// Estimated progress, within [0, 1]
    Progress(f32),
    /// Estimation ended, whatever the outcome
    End,
}

/// Estimation [Event]s listener
pub type Listener = Box<dyn FnMut(&Event)>;
