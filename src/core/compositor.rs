//! Compositor event loop.
//!
//! One `calloop` loop drives everything: guest listening sockets, the guest
//! display, the host connection, the control channel and the forced-refresh
//! timer. After each dispatch cycle both Wayland connections are flushed and
//! queued host events are handed to the bridges.

use std::os::unix::net::UnixStream;
use std::time::Duration;

use anyhow::{Context, Result};
use calloop::{
    generic::Generic,
    timer::{TimeoutAction, Timer},
    EventLoop, Interest, LoopHandle, Mode, PostAction, RegistrationToken,
};
use wayland_server::{Display, DisplayHandle};

use crate::config::Config;
use crate::core::errors::CoreError;
use crate::core::ipc::{self, ClientStatus, ControlHandler, ControlListener, IpcClient};
use crate::core::remote::RemoteDisplay;
use crate::core::socket_manager::SocketManager;
use crate::core::state::{ClientState, CompositorState};
use crate::util::logging::{COMPOSITOR, IPC, REMOTE};

/// Title of the nested window on the host.
const WINDOW_TITLE: &str = "kiosk-bridge";

// ============================================================================
// Loop Data
// ============================================================================

/// Event loop data shared by every source callback.
pub struct LoopData {
    pub state: CompositorState,
    pub display_handle: DisplayHandle,
    handle: LoopHandle<'static, LoopData>,
    sockets: SocketManager,
    refresh_interval: Duration,
    refresh_timer: Option<RegistrationToken>,
}

impl LoopData {
    /// Accept every pending guest connection.
    fn accept_clients(&mut self) {
        while let Some(stream) = self.sockets.accept_any() {
            if let Err(e) = self
                .display_handle
                .insert_client(stream, std::sync::Arc::new(ClientState))
            {
                tracing::error!(target: COMPOSITOR, "Failed to insert client: {}", e);
            }
        }
    }

    /// Register a control connection with the loop.
    fn add_ipc_client(&mut self, stream: UnixStream) {
        let mut client = IpcClient::new();
        let source = Generic::new(stream, Interest::BOTH, Mode::Edge);
        let result = self.handle.insert_source(source, move |readiness, stream, data| {
            // Safety: the stream is only read from and written to
            let stream = unsafe { stream.get_mut() };
            match client.on_ready(&*stream, readiness.readable, data) {
                Ok(ClientStatus::Open) => Ok(PostAction::Continue),
                Ok(ClientStatus::Closed) => {
                    tracing::debug!(target: IPC, "IPC client disconnected");
                    Ok(PostAction::Remove)
                }
                Err(e) => {
                    tracing::error!(target: IPC, "Closing IPC client: {}", e);
                    Ok(PostAction::Remove)
                }
            }
        });

        match result {
            Ok(_) => tracing::debug!(target: IPC, "IPC client connected"),
            Err(e) => tracing::error!(target: IPC, "Failed to register IPC client: {}", e.error),
        }
    }

    /// Start the forced-refresh timer unless it is already running.
    ///
    /// The timer removes itself at the first expiry after the flag clears.
    fn arm_refresh_timer(&mut self) {
        if self.refresh_timer.is_some() {
            return;
        }

        let interval = self.refresh_interval;
        let result = self
            .handle
            .insert_source(Timer::from_duration(interval), move |_, _, data| {
                if !data.state.force_refresh {
                    data.refresh_timer = None;
                    if data.state.surfaces.awaiting_frame() {
                        data.state.schedule_frame();
                    }
                    return TimeoutAction::Drop;
                }
                data.state.send_frame_callbacks();
                TimeoutAction::ToDuration(interval)
            });

        match result {
            Ok(token) => self.refresh_timer = Some(token),
            Err(e) => tracing::error!(target: COMPOSITOR, "Failed to arm refresh timer: {}", e.error),
        }
    }

    /// Flush both connections and apply queued host events.
    fn after_dispatch(&mut self) {
        self.state.handle_remote_events();

        if let Err(e) = self.display_handle.flush_clients() {
            tracing::warn!(target: COMPOSITOR, "Error flushing clients: {}", e);
        }
        if let Err(e) = self.state.remote.flush() {
            tracing::error!(target: REMOTE, "Host connection lost: {}", e);
            self.state.running = false;
        }
    }

    fn shutdown(&mut self) {
        tracing::info!(target: COMPOSITOR, "Stopping compositor");
        self.state.shutdown();
        if let Err(e) = self.display_handle.flush_clients() {
            tracing::warn!(target: COMPOSITOR, "Error flushing clients during shutdown: {}", e);
        }
        self.sockets.close_all();
    }
}

impl ControlHandler for LoopData {
    fn cursor_position(&self) -> (f64, f64) {
        self.state.cursor_position()
    }

    fn set_force_refresh(&mut self, enabled: bool) {
        self.state.set_force_refresh(enabled);
        if enabled {
            self.arm_refresh_timer();
        }
    }
}

// ============================================================================
// Main Compositor
// ============================================================================

/// The kiosk compositor: event loop plus everything it drives.
pub struct Compositor {
    event_loop: EventLoop<'static, LoopData>,
    data: LoopData,
}

impl Compositor {
    /// Connect to the host, open the guest socket and register every source.
    pub fn new(config: &Config) -> Result<Self> {
        let event_loop: EventLoop<'static, LoopData> =
            EventLoop::try_new().context("Failed to create event loop")?;
        let display = Display::<CompositorState>::new().context("Failed to create Wayland display")?;
        let display_handle = display.handle();

        let mut remote = RemoteDisplay::connect().context("Failed to connect to the host compositor")?;
        remote
            .create_window(WINDOW_TITLE, config.width, config.height)
            .context("Failed to map the nested window")?;
        let remote_fd = remote.poll_fd().context("Failed to duplicate host connection fd")?;

        let mut state = CompositorState::new(remote, display_handle.clone(), config);
        crate::core::wayland::register(&mut state, &display_handle, config);

        let mut sockets = SocketManager::from_env()?;
        let socket_name = match &config.socket {
            Some(name) => sockets.bind(name)?,
            None => sockets.bind_auto()?,
        };
        crate::wlog!(COMPOSITOR, "Guest clients connect with WAYLAND_DISPLAY={}", socket_name);

        let handle = event_loop.handle();
        register_sources(&handle, display, remote_fd, &sockets)?;

        let data = LoopData {
            state,
            display_handle,
            handle,
            sockets,
            refresh_interval: config.forced_refresh_interval(),
            refresh_timer: None,
        };

        Ok(Self { event_loop, data })
    }

    /// Run until the host closes the nested window or the connection drops.
    pub fn run(mut self) -> Result<()> {
        tracing::info!(target: COMPOSITOR, "Compositor running");
        while self.data.state.running {
            self.event_loop
                .dispatch(None, &mut self.data)
                .context("Event loop dispatch failed")?;
            self.data.after_dispatch();
        }
        self.data.shutdown();
        Ok(())
    }
}

fn register_sources(
    handle: &LoopHandle<'static, LoopData>,
    display: Display<CompositorState>,
    remote_fd: std::os::unix::io::OwnedFd,
    sockets: &SocketManager,
) -> crate::core::errors::Result<()> {
    for fd in sockets.poll_fds()? {
        handle
            .insert_source(Generic::new(fd, Interest::READ, Mode::Level), |_, _, data| {
                data.accept_clients();
                Ok(PostAction::Continue)
            })
            .map_err(|e| CoreError::socket_error(e.error.to_string()))?;
    }

    handle
        .insert_source(Generic::new(display, Interest::READ, Mode::Level), |_, display, data| {
            // Safety: the display is never replaced or dropped here
            let display = unsafe { display.get_mut() };
            if let Err(e) = display.dispatch_clients(&mut data.state) {
                tracing::error!(target: COMPOSITOR, "Failed to dispatch clients: {}", e);
            }
            Ok(PostAction::Continue)
        })
        .map_err(|e| CoreError::event_loop_error(e.error.to_string()))?;

    handle
        .insert_source(Generic::new(remote_fd, Interest::READ, Mode::Level), |_, _, data| {
            match data.state.remote.dispatch() {
                Ok(_) => Ok(PostAction::Continue),
                Err(e) => {
                    tracing::error!(target: REMOTE, "Host connection lost: {}", e);
                    data.state.running = false;
                    Ok(PostAction::Remove)
                }
            }
        })
        .map_err(|e| CoreError::event_loop_error(e.error.to_string()))?;

    match ipc::default_socket_path().and_then(ControlListener::bind) {
        Ok(listener) => {
            handle
                .insert_source(Generic::new(listener, Interest::READ, Mode::Level), |_, listener, data| {
                    // Safety: the listener is only accepted on
                    let listener = unsafe { listener.get_mut() };
                    loop {
                        match listener.accept() {
                            Ok(Some(stream)) => data.add_ipc_client(stream),
                            Ok(None) => break,
                            Err(e) => {
                                tracing::error!(target: IPC, "Failed to accept IPC client: {}", e);
                                break;
                            }
                        }
                    }
                    Ok(PostAction::Continue)
                })
                .map_err(|e| CoreError::event_loop_error(e.error.to_string()))?;
        }
        Err(e) => tracing::error!(target: IPC, "Control channel unavailable: {}", e),
    }

    Ok(())
}
