use std::io;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use maquila_core::TenantId;
use maquila_events::{EventBus, Subscription, TenantScoped};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Handle to stop and join a background worker.
#[derive(Debug)]
pub struct WorkerHandle {
    name: &'static str,
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Request shutdown and wait for the worker thread to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.shutdown.send(());
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                warn!(worker = self.name, "worker thread panicked");
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Bus consumer loop feeding an idempotent handler.
///
/// Delivery is at-least-once, so handlers must tolerate duplicates. A
/// handler error is logged and the loop moves on to the next message.
#[derive(Debug)]
pub struct ProjectionWorker;

impl ProjectionWorker {
    /// Subscribe to `bus` and spawn the consuming thread.
    ///
    /// With `tenant_id` set, messages of other companies are skipped.
    pub fn spawn<M, B, H, E>(
        name: &'static str,
        bus: &B,
        tenant_id: Option<TenantId>,
        mut handler: H,
    ) -> io::Result<WorkerHandle>
    where
        M: TenantScoped + Send + 'static,
        B: EventBus<M> + ?Sized,
        H: FnMut(M) -> Result<(), E> + Send + 'static,
        E: core::fmt::Display + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let sub: Subscription<M> = bus.subscribe();

        let join = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || worker_loop(name, sub, shutdown_rx, tenant_id, &mut handler))?;

        debug!(worker = name, tenant_id = ?tenant_id, "projection worker started");

        Ok(WorkerHandle {
            name,
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }
}

fn worker_loop<M, H, E>(
    name: &'static str,
    sub: Subscription<M>,
    shutdown_rx: mpsc::Receiver<()>,
    tenant_id: Option<TenantId>,
    handler: &mut H,
) where
    M: TenantScoped,
    H: FnMut(M) -> Result<(), E>,
    E: core::fmt::Display,
{
    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match sub.recv_timeout(POLL_INTERVAL) {
            Ok(msg) => {
                if tenant_id.is_some_and(|t| msg.tenant_id() != t) {
                    continue;
                }

                if let Err(err) = handler(msg) {
                    warn!(worker = name, error = %err, "projection worker handler failed");
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    debug!(worker = name, "projection worker stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    use maquila_events::InMemoryEventBus;

    use super::*;

    #[derive(Debug, Clone)]
    struct Msg(TenantId);

    impl TenantScoped for Msg {
        fn tenant_id(&self) -> TenantId {
            self.0
        }
    }

    fn wait_until(cond: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    #[test]
    fn pinned_worker_only_sees_its_tenant() {
        let bus = InMemoryEventBus::<Msg>::new();
        let mine = TenantId::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = seen.clone();
        let handle = ProjectionWorker::spawn("test.pinned", &bus, Some(mine), move |m: Msg| {
            assert_eq!(m.0, mine);
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<(), String>(())
        })
        .unwrap();

        bus.publish(Msg(TenantId::new())).unwrap();
        bus.publish(Msg(mine)).unwrap();
        bus.publish(Msg(mine)).unwrap();

        assert!(wait_until(|| seen.load(Ordering::SeqCst) == 2));
        handle.shutdown();
    }

    #[test]
    fn handler_errors_do_not_stop_the_worker() {
        let bus = InMemoryEventBus::<Msg>::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = seen.clone();
        let handle = ProjectionWorker::spawn("test.errors", &bus, None, move |_m: Msg| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            if n == 0 { Err("boom".to_string()) } else { Ok(()) }
        })
        .unwrap();

        bus.publish(Msg(TenantId::new())).unwrap();
        bus.publish(Msg(TenantId::new())).unwrap();

        assert!(wait_until(|| seen.load(Ordering::SeqCst) == 2));
        handle.shutdown();
    }
}
