//! Listener binding and the sequential accept loop.

use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use edigate_config::{NotifySettings, SocketEndpoint};
use edigate_notify::{Notification, Notifier};
use edigate_process::JobSpec;
use edigate_protocol::SessionStream;

use crate::DISPATCH_TARGET;
use crate::errors::{DispatchError, ListenError};
use crate::handoff;
use crate::notification_timestamp;

#[cfg(unix)]
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::FileTypeExt;
#[cfg(unix)]
use std::os::unix::net::{UnixListener, UnixStream};
#[cfg(unix)]
use std::path::Path;

/// Pause between accept polls while no connection is pending.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(25);

/// Per-dispatcher settings fixed at startup.
#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    /// Receiver worker to spawn per accepted connection.
    pub worker: JobSpec,
    /// Grace period before the dispatcher reclaims its connection copy.
    pub grace: Duration,
    /// Notification addressing.
    pub notify: NotifySettings,
}

/// Accepts inbound connections and hands each to a receiver worker.
pub struct Dispatcher {
    endpoint: SocketEndpoint,
    listener: ListenerKind,
    settings: DispatcherSettings,
    notifier: Arc<dyn Notifier>,
}

enum ListenerKind {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("endpoint", &self.endpoint)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Binds the inbound listener.
    ///
    /// A stale Unix socket left by a crashed daemon is removed when nothing
    /// answers on it; a live one is reported as in use.
    ///
    /// # Errors
    ///
    /// Returns a [`ListenError`] when the endpoint cannot be bound.
    pub fn bind(
        endpoint: &SocketEndpoint,
        settings: DispatcherSettings,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, ListenError> {
        let listener = match endpoint {
            SocketEndpoint::Tcp { host, port } => ListenerKind::Tcp(bind_tcp(host, *port)?),
            SocketEndpoint::Unix { path } => {
                #[cfg(unix)]
                {
                    ListenerKind::Unix(bind_unix(path.as_std_path())?)
                }
                #[cfg(not(unix))]
                {
                    return Err(ListenError::UnsupportedUnix {
                        endpoint: endpoint.to_string(),
                    });
                }
            }
        };
        let dispatcher = Self {
            endpoint: endpoint.clone(),
            listener,
            settings,
            notifier,
        };
        dispatcher.set_nonblocking()?;
        Ok(dispatcher)
    }

    /// Local address of a TCP listener, for tests and diagnostics.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.listener {
            ListenerKind::Tcp(listener) => listener.local_addr().ok(),
            #[cfg(unix)]
            ListenerKind::Unix(_) => None,
        }
    }

    /// Runs the sequential accept loop until `shutdown` is raised.
    ///
    /// Each accepted connection is dispatched on its own thread so
    /// concurrent peers do not block one another; the accept loop itself
    /// stays sequential. Worker failures reported by dispatch threads end
    /// the loop.
    ///
    /// # Errors
    ///
    /// Returns a [`DispatchError`] on an accept failure or when any
    /// receiver worker fails; both are fatal by design.
    pub fn run(&self, shutdown: &AtomicBool) -> Result<(), DispatchError> {
        info!(
            target: DISPATCH_TARGET,
            endpoint = %self.endpoint,
            worker = self.settings.worker.command(),
            "dispatcher accepting connections"
        );
        let (failure_tx, failure_rx) = mpsc::channel::<DispatchError>();
        let result = loop {
            if shutdown.load(Ordering::SeqCst) {
                break Ok(());
            }
            if let Ok(failure) = failure_rx.try_recv() {
                break Err(failure);
            }
            match self.accept_one() {
                Ok(Some(stream)) => self.dispatch(stream, failure_tx.clone()),
                Ok(None) => thread::sleep(ACCEPT_BACKOFF),
                Err(source) => break Err(DispatchError::Accept { source }),
            }
        };
        #[cfg(unix)]
        self.cleanup_unix_socket();
        if let Err(error) = &result {
            self.notify_fatal(error);
        }
        result
    }

    fn accept_one(&self) -> Result<Option<SessionStream>, io::Error> {
        match &self.listener {
            ListenerKind::Tcp(listener) => match listener.accept() {
                Ok((stream, _)) => {
                    stream.set_nonblocking(false)?;
                    Ok(Some(SessionStream::Tcp(stream)))
                }
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(None),
                Err(error) => Err(error),
            },
            #[cfg(unix)]
            ListenerKind::Unix(listener) => match listener.accept() {
                Ok((stream, _)) => {
                    stream.set_nonblocking(false)?;
                    Ok(Some(SessionStream::Unix(stream)))
                }
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(None),
                Err(error) => Err(error),
            },
        }
    }

    fn dispatch(&self, stream: SessionStream, failure_tx: Sender<DispatchError>) {
        let peer = stream.peer_description();
        info!(
            target: DISPATCH_TARGET,
            peer = %peer,
            "connection accepted; handing off to receiver worker"
        );
        let spec = self.settings.worker.clone();
        let grace = self.settings.grace;
        let notify = self.settings.notify.clone();
        let notifier = Arc::clone(&self.notifier);
        thread::spawn(move || {
            let command = spec.command().to_string();
            match handoff::hand_off(stream, spec, grace) {
                Ok(outcome) if outcome.success() => {
                    info!(
                        target: DISPATCH_TARGET,
                        peer = %peer,
                        "receiver worker finished"
                    );
                }
                Ok(outcome) => {
                    notifier.notify(&Notification::new(
                        &notify.from,
                        &notify.to,
                        "[EDI] Receiver worker failed",
                        format!(
                            "Child Process: {command}\n\
                             Peer: {peer}\n\
                             Error: worker finished with {outcome}\n\
                             Date Time: {}\n",
                            notification_timestamp()
                        ),
                    ));
                    let _ = failure_tx.send(DispatchError::WorkerExit { command, outcome });
                }
                Err(source) => {
                    notifier.notify(&Notification::new(
                        &notify.from,
                        &notify.to,
                        "[EDI] Failed to start receiver worker",
                        format!(
                            "Child Process: {command}\n\
                             Peer: {peer}\n\
                             Error: {source}\n\
                             Date Time: {}\n",
                            notification_timestamp()
                        ),
                    ));
                    let _ = failure_tx.send(DispatchError::Worker { source });
                }
            }
        });
    }

    fn notify_fatal(&self, error: &DispatchError) {
        // Worker failures were already notified from the dispatch thread.
        if let DispatchError::Accept { .. } = error {
            self.notifier.notify(&Notification::new(
                &self.settings.notify.from,
                &self.settings.notify.to,
                "[EDI] Dispatcher accept failure",
                format!(
                    "Endpoint: {}\nError: {error}\nDate Time: {}\n",
                    self.endpoint,
                    notification_timestamp()
                ),
            ));
        }
    }

    fn set_nonblocking(&self) -> Result<(), ListenError> {
        let switched = match &self.listener {
            ListenerKind::Tcp(listener) => listener.set_nonblocking(true),
            #[cfg(unix)]
            ListenerKind::Unix(listener) => listener.set_nonblocking(true),
        };
        switched.map_err(|source| ListenError::NonBlocking { source })
    }

    #[cfg(unix)]
    fn cleanup_unix_socket(&self) {
        let Some(path) = self.endpoint.unix_path() else {
            return;
        };
        if let Err(error) = fs::remove_file(path.as_std_path())
            && error.kind() != io::ErrorKind::NotFound
        {
            warn!(
                target: DISPATCH_TARGET,
                path = %path,
                error = %error,
                "failed to remove unix socket file"
            );
        }
    }
}

fn bind_tcp(host: &str, port: u16) -> Result<TcpListener, ListenError> {
    let mut addrs = (host, port)
        .to_socket_addrs()
        .map_err(|source| ListenError::Resolve {
            host: host.to_string(),
            port,
            source,
        })?;
    let addr = addrs
        .find(|addr| matches!(addr, SocketAddr::V4(_) | SocketAddr::V6(_)))
        .ok_or_else(|| ListenError::ResolveEmpty {
            host: host.to_string(),
            port,
        })?;
    TcpListener::bind(addr).map_err(|source| ListenError::BindTcp { addr, source })
}

#[cfg(unix)]
fn bind_unix(path: &Path) -> Result<UnixListener, ListenError> {
    if path.exists() {
        let metadata = fs::symlink_metadata(path).map_err(|source| ListenError::UnixInspect {
            path: path.display().to_string(),
            source,
        })?;
        if !metadata.file_type().is_socket() {
            return Err(ListenError::UnixNotSocket {
                path: path.display().to_string(),
            });
        }
        match UnixStream::connect(path) {
            Ok(_stream) => {
                return Err(ListenError::UnixInUse {
                    path: path.display().to_string(),
                });
            }
            Err(error)
                if error.kind() == io::ErrorKind::ConnectionRefused
                    || error.kind() == io::ErrorKind::NotFound =>
            {
                fs::remove_file(path).map_err(|source| ListenError::UnixCleanup {
                    path: path.display().to_string(),
                    source,
                })?;
            }
            Err(source) => {
                return Err(ListenError::UnixInspect {
                    path: path.display().to_string(),
                    source,
                });
            }
        }
    }

    UnixListener::bind(path).map_err(|source| ListenError::BindUnix {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpStream;
    use std::time::Instant;

    use edigate_notify::LogNotifier;

    fn settings(worker_script: &str, grace: Duration) -> DispatcherSettings {
        DispatcherSettings {
            worker: JobSpec::new("/bin/sh").args(["-c", worker_script]),
            grace,
            notify: NotifySettings::default(),
        }
    }

    fn bound_dispatcher(worker_script: &str, grace: Duration) -> Dispatcher {
        let endpoint = SocketEndpoint::tcp("127.0.0.1", 0);
        Dispatcher::bind(
            &endpoint,
            settings(worker_script, grace),
            Arc::new(LogNotifier::new()),
        )
        .expect("bind dispatcher")
    }

    fn read_all(stream: &mut TcpStream) -> String {
        let mut payload = String::new();
        stream.read_to_string(&mut payload).expect("read payload");
        payload
    }

    #[test]
    fn serves_successive_connections_through_workers() {
        let dispatcher = bound_dispatcher("printf served >&3", Duration::from_secs(2));
        let addr = dispatcher.local_addr().expect("tcp address");
        let shutdown = Arc::new(AtomicBool::new(false));
        let stop = Arc::clone(&shutdown);
        let loop_thread = thread::spawn(move || dispatcher.run(&stop));

        let mut first = TcpStream::connect(addr).expect("connect first peer");
        let mut second = TcpStream::connect(addr).expect("connect second peer");
        assert_eq!(read_all(&mut first), "served");
        assert_eq!(read_all(&mut second), "served");

        shutdown.store(true, Ordering::SeqCst);
        loop_thread
            .join()
            .expect("join loop")
            .expect("loop should end cleanly");
    }

    #[test]
    fn unclaimed_connection_is_reclaimed_and_the_loop_keeps_serving() {
        // First worker never touches the inherited connection; the grace
        // timer reclaims the dispatcher copy while the loop serves the
        // next peer.
        let dispatcher = bound_dispatcher(
            "exec 3<&-; sleep 0.4",
            Duration::from_millis(100),
        );
        let addr = dispatcher.local_addr().expect("tcp address");
        let shutdown = Arc::new(AtomicBool::new(false));
        let stop = Arc::clone(&shutdown);
        let loop_thread = thread::spawn(move || dispatcher.run(&stop));

        let started = Instant::now();
        let mut first = TcpStream::connect(addr).expect("connect first peer");
        let mut second = TcpStream::connect(addr).expect("connect second peer");

        // Both connections drain to end of stream once their workers exit,
        // proving the loop dispatched the second peer while the first
        // worker was still alive.
        assert_eq!(read_all(&mut second), "");
        assert_eq!(read_all(&mut first), "");
        assert!(started.elapsed() < Duration::from_secs(2));

        shutdown.store(true, Ordering::SeqCst);
        loop_thread
            .join()
            .expect("join loop")
            .expect("loop should end cleanly");
    }

    #[test]
    fn worker_failure_is_fatal_to_the_loop() {
        let dispatcher = bound_dispatcher("exit 2", Duration::from_millis(100));
        let addr = dispatcher.local_addr().expect("tcp address");
        let shutdown = Arc::new(AtomicBool::new(false));
        let stop = Arc::clone(&shutdown);
        let loop_thread = thread::spawn(move || dispatcher.run(&stop));

        let _peer = TcpStream::connect(addr).expect("connect peer");
        let error = loop_thread
            .join()
            .expect("join loop")
            .expect_err("worker failure should end the loop");
        assert!(matches!(error, DispatchError::WorkerExit { .. }));
    }

    #[test]
    fn stale_unix_socket_is_recovered() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("edigated.sock");
        {
            let _stale = UnixListener::bind(&path).expect("bind stale listener");
        }
        assert!(path.exists(), "stale socket should remain");

        let endpoint = SocketEndpoint::unix(path.to_str().expect("utf8 path").to_string());
        let dispatcher = Dispatcher::bind(
            &endpoint,
            settings("exit 0", Duration::from_millis(100)),
            Arc::new(LogNotifier::new()),
        )
        .expect("bind over stale socket");
        drop(dispatcher);
    }

    #[test]
    fn live_unix_socket_is_reported_in_use() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("edigated.sock");
        let _existing = UnixListener::bind(&path).expect("bind existing listener");

        let endpoint = SocketEndpoint::unix(path.to_str().expect("utf8 path").to_string());
        let error = Dispatcher::bind(
            &endpoint,
            settings("exit 0", Duration::from_millis(100)),
            Arc::new(LogNotifier::new()),
        )
        .expect_err("bind should fail");
        assert!(matches!(error, ListenError::UnixInUse { .. }));
    }
}
