use std::time::{Duration, Instant};

use compio::time::sleep;
use futures::stream::{FusedStream, Stream};
use futures::{FutureExt, StreamExt, pin_mut, select};
use futures_channel::mpsc::UnboundedReceiver;
use tracing::{debug, trace, warn};

use crate::project::DataProject;
use crate::vfs::error::VfsError;
use crate::vfs::local::LocalVfs;
use crate::vfs::types::{VfsReply, WatchEvent};

/// Longest sleep between two checks of the project.
const IDLE_WAIT: Duration = Duration::from_millis(250);

/// Anything the filesystem side hands back to the project.
#[derive(Debug)]
pub enum VfsInput {
    Reply(VfsReply),
    Event(WatchEvent),
}

/// Merges replies and watch events. Without a monitor only replies flow.
pub fn inputs(
    replies: UnboundedReceiver<VfsReply>,
    events: Option<UnboundedReceiver<WatchEvent>>,
) -> impl Stream<Item = VfsInput> + FusedStream + Unpin {
    let events = match events {
        Some(events) => events.left_stream(),
        None => futures::stream::empty().right_stream(),
    };
    futures::stream::select(replies.map(VfsInput::Reply), events.map(VfsInput::Event)).fuse()
}

/// Feeds the project until it has nothing left to wait for and, when
/// `watch_until` is set, keeps folding filesystem changes in until then.
pub async fn drive<S>(
    project: &mut DataProject,
    vfs: &LocalVfs,
    inputs: &mut S,
    watch_until: Option<Instant>,
) -> Result<(), VfsError>
where
    S: Stream<Item = VfsInput> + FusedStream + Unpin,
{
    loop {
        for request in project.take_requests() {
            trace!("Submitting {:?}", request);
            vfs.submit(request)?;
        }

        let now = Instant::now();
        let busy = project.has_pending_work();
        let watching = watch_until.is_some_and(|until| now < until);
        if !busy && !watching {
            debug!("Project is idle");
            return Ok(());
        }

        let wake_up = [project.next_deadline(), watch_until]
            .into_iter()
            .flatten()
            .min()
            .map_or(IDLE_WAIT, |deadline| {
                deadline.saturating_duration_since(now).min(IDLE_WAIT)
            });
        let timer = sleep(wake_up).fuse();
        pin_mut!(timer);

        select! {
            input = inputs.next() => match input {
                Some(VfsInput::Reply(reply)) => project.handle_reply(reply),
                Some(VfsInput::Event(event)) => project.handle_event(event, Instant::now()),
                None if busy => return Err(VfsError::RepliesEnded),
                None => {
                    warn!("Filesystem inputs ended while watching");
                    return Ok(());
                }
            },
            _ = timer => {}
        }
        project.tick(Instant::now());
    }
}
