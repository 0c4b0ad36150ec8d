use futures::Stream;
use futures::stream;
use tracing::warn;

use super::EtcdClient;
use crate::core::models::EtcdResponse;
use crate::core::options::WatchOptions;
use crate::errors::{ErrorCode, EtcdError};

struct WatchState {
    key: String,
    options: WatchOptions,
    finished: bool,
}

impl EtcdClient {
    /// Continuous watch on `key`.
    ///
    /// Each event advances the wait index past the event's modified index, so
    /// no change is reported twice. When the server has already compacted the
    /// requested index the watch resumes from the current cluster index. Any
    /// other error is yielded once and ends the stream.
    pub fn watch_stream<'a>(
        &'a self,
        key: &str,
        options: WatchOptions,
    ) -> impl Stream<Item = Result<EtcdResponse, EtcdError>> + use<'a> {
        let state = WatchState {
            key: key.to_string(),
            options,
            finished: false,
        };

        stream::unfold(state, move |mut state| async move {
            if state.finished {
                return None;
            }
            loop {
                match self.watch(&state.key, &state.options).await {
                    Ok(event) => {
                        let next = event.node.modified_index.saturating_add(1);
                        state.options.wait_index = Some(next);
                        return Some((Ok(event), state));
                    }
                    Err(EtcdError::Api(err)) if err.code() == ErrorCode::EventIndexCleared => {
                        let resume = err.index.saturating_add(1);
                        warn!(
                            "Watch index for {} was cleared, resuming from {}",
                            state.key, resume
                        );
                        state.options.wait_index = Some(resume);
                    }
                    Err(err) => {
                        state.finished = true;
                        return Some((Err(err), state));
                    }
                }
            }
        })
    }
}
