use std::future::Future;
use std::num::NonZeroUsize;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub(crate) enum Halted<E> {
    Failed(E),
    Cancelled,
}

/// Spawns the futures yielded by `tasks`, keeping at most `limit` of them
/// running. Outputs are handed to `on_output` in completion order.
///
/// `cancel` is checked before each spawn. On the first error or observed
/// cancellation no further task is spawned, `halt` is fired and the tasks
/// still running are awaited before returning. Their outputs are dropped.
pub(crate) async fn dispatch_concurrent<I, F, T, E>(
    tasks: I,
    limit: NonZeroUsize,
    cancel: Option<&CancellationToken>,
    halt: &CancellationToken,
    mut on_output: impl FnMut(T),
) -> Result<(), Halted<E>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: From<JoinError> + Send + 'static,
{
    let mut running = JoinSet::new();
    let mut halted = None;

    'schedule: for task in tasks {
        while running.len() >= limit.get() {
            if let Some(joined) = running.join_next().await {
                match flatten(joined) {
                    Ok(output) => on_output(output),
                    Err(e) => {
                        halted = Some(Halted::Failed(e));
                        break 'schedule;
                    }
                }
            }
        }
        if cancel.map_or(false, CancellationToken::is_cancelled) {
            halted = Some(Halted::Cancelled);
            break;
        }
        running.spawn(task);
    }

    if halted.is_none() {
        while let Some(joined) = running.join_next().await {
            match flatten(joined) {
                Ok(output) => on_output(output),
                Err(e) => {
                    halted = Some(Halted::Failed(e));
                    break;
                }
            }
        }
    }

    match halted {
        None => Ok(()),
        Some(halted) => {
            halt.cancel();
            while running.join_next().await.is_some() {}
            Err(halted)
        }
    }
}

fn flatten<T, E>(joined: Result<Result<T, E>, JoinError>) -> Result<T, E>
where
    E: From<JoinError>,
{
    joined.map_err(E::from).and_then(|output| output)
}
