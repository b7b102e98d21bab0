//! Queue and track model.
//!
//! The coordinator treats everything on a [`Track`] except `id`, `source`,
//! and `duration` as opaque — display metadata is forwarded verbatim
//! without being interpreted.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Immutable track descriptor used by the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    /// Opaque identifier, meaningful only to the external catalog/resolver.
    pub id: String,
    /// Opaque source tag (e.g. which catalog adapter this came from).
    pub source: String,
    /// Track duration in seconds. Must be positive.
    pub duration: f64,
    /// Display metadata (title, artist, artwork,...) forwarded verbatim.
    /// The coordinator never reads into this; only `id`/`source`/`duration`
    /// have coordinator-visible meaning.
    #[serde(default, flatten)]
    pub extra: std::collections::BTreeMap<String, Value>,
}

impl Track {
    /// Creates a track with no extra metadata. Mostly useful in tests.
    #[must_use]
    pub fn new(id: impl Into<String>, source: impl Into<String>, duration: f64) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            duration,
            extra: Default::default(),
        }
    }
}

/// Ordered sequence of tracks with a current-playback index.
///
/// `current_index < queue.len()` whenever `queue` is non-empty;
/// `current_index == 0` when empty.
#[derive(Debug, Clone, Default)]
pub struct Queue {
    tracks: Vec<Track>,
    current_index: usize,
}

/// The effect a queue mutation had on the currently-playing track, used by
/// the coordinator to decide whether playback must restart or navigate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalEffect {
    /// The current track was unaffected (removal was after it, or the
    /// queue doesn't consider it current).
    Unaffected,
    /// The current index shifted left by one but still refers to the same
    /// track (removal was before it).
    IndexShifted,
    /// The queue became empty.
    BecameEmpty,
    /// The current track was removed and it was the last track in the
    /// queue: playback rewinds to the first remaining track and stops.
    CurrentRemovedWrap,
    /// The current track was removed but another track shifted into its
    /// place; playback continues uninterrupted, no mode change is made.
    CurrentRemovedMiddle,
}

impl Queue {
    /// Number of tracks in the queue.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Returns the current index (always `0` when empty per I2).
    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    /// Returns the currently-selected track, if any.
    #[must_use]
    pub fn current(&self) -> Option<&Track> {
        self.tracks.get(self.current_index)
    }

    /// Returns the full track list.
    #[must_use]
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Appends a track to the end of the queue.
    ///
    /// If the queue was empty, the new track becomes current (I2/I3 keep
    /// holding: `current_index` stays `0`, which now points at it).
    pub fn append(&mut self, track: Track) {
        self.tracks.push(track);
    }

    /// Removes the track at `index`, adjusting `current_index` per the
    /// rules in.
    ///
    /// Returns `None` if `index` is out of range (caller should treat this
    /// as a protocol error and drop the command, per §7).
    pub fn remove_at(&mut self, index: usize) -> Option<RemovalEffect> {
        if index >= self.tracks.len() {
            return None;
        }

        self.tracks.remove(index);

        let effect = match index.cmp(&self.current_index) {
            std::cmp::Ordering::Less => {
                self.current_index -= 1;
                RemovalEffect::IndexShifted
            }
            std::cmp::Ordering::Equal => {
                if self.tracks.is_empty() {
                    self.current_index = 0;
                    RemovalEffect::BecameEmpty
                } else if self.current_index >= self.tracks.len() {
                    // Removed the last track while it was current: rewind to
                    // the first remaining track (/§9 "rewind to 0").
                    self.current_index = 0;
                    RemovalEffect::CurrentRemovedWrap
                } else {
                    // current_index now points at what was the next track.
                    RemovalEffect::CurrentRemovedMiddle
                }
            }
            std::cmp::Ordering::Greater => RemovalEffect::Unaffected,
        };

        Some(effect)
    }

    /// Replaces the queue wholesale and sets the current index.
    ///
    /// `hardened_index`, if present, overrides `new_index` — this is how
    /// the coordinator applies the recommended reorder hardening (recompute
    /// the index by matching the previously-current track id) while still
    /// honoring the client-supplied index when that track disappeared.
    pub fn reorder(&mut self, new_queue: Vec<Track>, new_index: usize) {
        self.tracks = new_queue;
        self.current_index = if self.tracks.is_empty() {
            0
        } else {
            new_index.min(self.tracks.len() - 1)
        };
    }

    /// Finds the position of a track by id, for reorder-hardening.
    #[must_use]
    pub fn position_of(&self, id: &str) -> Option<usize> {
        self.tracks.iter().position(|t| t.id == id)
    }

    /// Jumps to an arbitrary index, if in range.
    ///
    /// Returns `true` if the index was valid and applied.
    pub fn jump_to(&mut self, index: usize) -> bool {
        if index < self.tracks.len() {
            self.current_index = index;
            true
        } else {
            false
        }
    }

    /// Advances to the next track. Returns `true` if there was a next
    /// track, `false` if this was the last (caller should pause instead).
    pub fn advance(&mut self) -> bool {
        if self.current_index + 1 < self.tracks.len() {
            self.current_index += 1;
            true
        } else {
            false
        }
    }

    /// Moves to the previous track, if any. Returns `true` if applied.
    pub fn previous(&mut self) -> bool {
        if self.current_index > 0 {
            self.current_index -= 1;
            true
        } else {
            false
        }
    }
}
