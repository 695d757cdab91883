use std::time::Duration;

use crate::source::Transcoder;

/// Side effect run by the scheduler when the player goes idle.
pub type IdleFn = Box<dyn FnMut() + Send>;

/// Player behavior knobs.
///
/// Plain struct; start from [`Default`] and override fields:
///
/// ```
/// use deck_player::PlayerConfig;
///
/// let cfg = PlayerConfig {
///     queue_length: 10,
///     ..Default::default()
/// };
/// ```
pub struct PlayerConfig {
    /// Maximum number of queued items. `0` means unbounded.
    pub queue_length: usize,

    /// How long the scheduler waits for the next item before running the
    /// idle action. `None` disables idle handling; the scheduler then blocks
    /// until an item arrives or the player is closed.
    pub idle_timeout: Option<Duration>,

    /// Invoked once at construction and again each time a poll for the next
    /// item times out. Typical use: disconnect, or return to a default
    /// location.
    pub on_idle: Option<IdleFn>,

    /// Applied to the source of every item not marked pre-encoded.
    pub transcoder: Option<Box<dyn Transcoder>>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            queue_length: 100,
            idle_timeout: Some(Duration::from_millis(300)),
            on_idle: None,
            transcoder: None,
        }
    }
}
