//! Static table of allowed lifecycle transitions
//!
//! `None` stands for the uninitialized state before anything was accepted.

use crate::types::EventKind;

use EventKind::*;

/// Events permitted to follow `current`
pub fn permitted(current: Option<EventKind>) -> &'static [EventKind] {
    match current {
        None => &[Play, Error],
        Some(Play) => &[Playing, Ended, Pause, VariantChanged, Seeking, Error],
        Some(Playing) => &[Buffering, Pause, Ended, Seeking, VariantChanged, Error],
        Some(Buffering) => &[Buffered, Error, VariantChanged],
        Some(Buffered) => &[Pause, Seeking, Playing, Ended, Error, VariantChanged],
        Some(Pause) => &[Seeking, Play, Ended, Error, VariantChanged],
        Some(Seeking) => &[Seeked, Ended, Error, VariantChanged],
        Some(Seeked) => &[Play, Ended, Error, VariantChanged, Playing, Seeking],
        Some(Ended) => &[Play, Pause, Error, VariantChanged],
        Some(Error) => &[Playing, Play, Pause, Buffered],
        // Never stored as the resting state.
        Some(VariantChanged) => &[],
    }
}

/// Check if `next` may follow `current`
pub fn can_transition(current: Option<EventKind>, next: EventKind) -> bool {
    permitted(current).contains(&next)
}
