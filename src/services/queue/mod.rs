mod reconciler;
mod traits;
mod types;

pub use reconciler::{QueueError, QueueReconciler};
pub use traits::{EnginePlaylistId, PlayerEngine, PlayerEngineError, PlayerEngineEvent, PlayerState};
pub use types::{
    ClearConfirmOptions, PersistedQueue, PlayerTrack, QueueItem, QueueItemId, QueueSource,
    QueueSourceKind, RepeatMode, ReplaceOptions, StarToggle,
};
