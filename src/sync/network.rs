//! UDP transport of the start/stop barrier and the clock exchange.
//!
//! All socket work runs on the pipeline's tokio runtime. Blocking entry
//! points (`start_barrier`, `send_stop`, `shutdown`) are called from the
//! orchestrator thread and drive the runtime with `block_on`; the stop
//! listener and the clock tasks run in the background until the
//! cancellation token fires.

use super::{OffsetEstimator, SyncError, SyncMessage};
use crate::config::{SyncMode, SyncSettings};
use crate::pipeline::PipelineShared;
use std::collections::HashSet;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const MAX_DATAGRAM: usize = 64;
const START_REPEAT_GAP: Duration = Duration::from_millis(50);
const TASK_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

pub struct NetworkSync {
    settings: SyncSettings,
    shared: Arc<PipelineShared>,
    handle: Handle,
    cancel: CancellationToken,
    start_socket: Option<Arc<UdpSocket>>,
    tasks: Vec<JoinHandle<()>>,
}

impl NetworkSync {
    pub fn new(
        settings: SyncSettings,
        shared: Arc<PipelineShared>,
        handle: Handle,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            settings,
            shared,
            handle,
            cancel,
            start_socket: None,
            tasks: Vec::new(),
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Master: send the start datagram. Slave: block until it arrives or
    /// the cancellation token fires.
    pub fn start_barrier(&mut self) -> Result<(), SyncError> {
        if self.settings.is_master() {
            self.handle.block_on(send_repeated(
                self.settings.start_target(),
                SyncMessage::Start,
                self.settings.start_repeats.max(1),
            ))
        } else {
            let socket = self
                .handle
                .block_on(wait_for_start(self.settings.start_port, self.cancel.clone()))?;
            self.start_socket = Some(Arc::new(socket));
            Ok(())
        }
    }

    /// Spawn the stop listener (slave) and, in continuous mode, the clock
    /// server (master) or client (slave)
    pub fn spawn_background(&mut self) -> Result<(), SyncError> {
        if !self.settings.is_master() {
            if let Some(socket) = self.start_socket.clone() {
                let task = stop_listener(socket, self.cancel.clone(), Arc::clone(&self.shared));
                self.tasks.push(self.handle.spawn(task));
            }
        }

        if self.settings.mode != SyncMode::Continuous {
            return Ok(());
        }

        if self.settings.is_master() {
            let port = self.settings.clock_port;
            let socket = self
                .handle
                .block_on(UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port)))?;
            info!(port, "Clock server listening");
            let task = clock_server(socket, self.cancel.clone(), Arc::clone(&self.shared));
            self.tasks.push(self.handle.spawn(task));
        } else {
            let target = self.settings.clock_target();
            let socket = self.handle.block_on(UdpSocket::bind(unspecified_for(target)))?;
            info!(%target, interval_ms = self.settings.interval_ms, "Clock client started");
            let task = clock_client(
                socket,
                target,
                self.settings.clone(),
                self.cancel.clone(),
                Arc::clone(&self.shared),
            );
            self.tasks.push(self.handle.spawn(task));
        }
        Ok(())
    }

    /// Master only: broadcast the stop datagram
    pub fn send_stop(&self) -> Result<(), SyncError> {
        if !self.settings.is_master() {
            return Ok(());
        }
        self.handle.block_on(send_repeated(
            self.settings.start_target(),
            SyncMessage::Stop,
            1,
        ))
    }

    /// Cancel the background tasks and wait briefly for them to exit
    pub fn shutdown(&mut self) {
        self.cancel.cancel();
        let tasks: Vec<_> = self.tasks.drain(..).collect();
        if tasks.is_empty() {
            return;
        }
        self.handle.block_on(async move {
            for task in tasks {
                let _ = tokio::time::timeout(TASK_JOIN_TIMEOUT, task).await;
            }
        });
        self.start_socket = None;
        debug!("Network sync shut down");
    }
}

impl Drop for NetworkSync {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn unspecified_for(target: SocketAddr) -> SocketAddr {
    match target {
        SocketAddr::V4(_) => SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)),
        SocketAddr::V6(_) => SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0)),
    }
}

async fn send_repeated(target: SocketAddr, message: SyncMessage, repeats: u32) -> Result<(), SyncError> {
    let socket = UdpSocket::bind(unspecified_for(target)).await?;
    socket.set_broadcast(true)?;
    let bytes = message.encode();
    for i in 0..repeats {
        if i > 0 {
            tokio::time::sleep(START_REPEAT_GAP).await;
        }
        socket.send_to(&bytes, target).await?;
    }
    info!(%target, ?message, repeats, "Sent sync datagram");
    Ok(())
}

async fn wait_for_start(port: u16, cancel: CancellationToken) -> Result<UdpSocket, SyncError> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port)).await?;
    info!(port, "Waiting for start signal");
    let mut buf = [0u8; MAX_DATAGRAM];
    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
            received = socket.recv_from(&mut buf) => received,
        };
        let (len, from) = match received {
            Ok(r) => r,
            Err(e) => {
                warn!("Receive error while waiting for start: {}", e);
                continue;
            }
        };
        match SyncMessage::decode(&buf[..len]) {
            Ok(SyncMessage::Start) => {
                info!(%from, "Start signal received");
                return Ok(socket);
            }
            Ok(other) => debug!(%from, ?other, "Ignoring datagram while waiting for start"),
            Err(e) => warn!(%from, "Ignoring datagram: {}", e),
        }
    }
}

async fn stop_listener(socket: Arc<UdpSocket>, cancel: CancellationToken, shared: Arc<PipelineShared>) {
    let mut buf = [0u8; MAX_DATAGRAM];
    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => return,
            received = socket.recv_from(&mut buf) => received,
        };
        match received {
            Ok((len, from)) => match SyncMessage::decode(&buf[..len]) {
                Ok(SyncMessage::Stop) => {
                    shared
                        .supervisor()
                        .request_stop(format!("stop signal from {}", from));
                    return;
                }
                Ok(_) => {}
                Err(e) => warn!(%from, "Ignoring datagram: {}", e),
            },
            Err(e) => warn!("Stop listener receive error: {}", e),
        }
    }
}

async fn clock_server(socket: UdpSocket, cancel: CancellationToken, shared: Arc<PipelineShared>) {
    let mut buf = [0u8; MAX_DATAGRAM];
    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => return,
            received = socket.recv_from(&mut buf) => received,
        };
        let (len, from) = match received {
            Ok(r) => r,
            Err(e) => {
                warn!("Clock server receive error: {}", e);
                continue;
            }
        };
        match SyncMessage::decode(&buf[..len]) {
            Ok(SyncMessage::Request { sent_ms }) => {
                let reply = SyncMessage::Time {
                    request_sent_ms: sent_ms,
                    master_ms: shared.clock().time_ms(),
                };
                if let Err(e) = socket.send_to(&reply.encode(), from).await {
                    warn!(%from, "Failed to send clock reply: {}", e);
                }
            }
            Ok(other) => debug!(%from, ?other, "Clock server ignoring datagram"),
            Err(e) => warn!(%from, "Ignoring datagram: {}", e),
        }
    }
}

async fn clock_client(
    socket: UdpSocket,
    target: SocketAddr,
    settings: SyncSettings,
    cancel: CancellationToken,
    shared: Arc<PipelineShared>,
) {
    let requests = settings.requests_per_interval.max(1);
    let spacing = settings.interval() / requests;
    let mut estimator = OffsetEstimator::new();
    let mut outstanding = HashSet::new();
    let mut buf = [0u8; MAX_DATAGRAM];

    loop {
        for _ in 0..requests {
            let sent_ms = shared.clock().time_ms();
            match socket
                .send_to(&SyncMessage::Request { sent_ms }.encode(), target)
                .await
            {
                Ok(_) => {
                    outstanding.insert(sent_ms);
                }
                Err(e) => warn!(%target, "Failed to send clock request: {}", e),
            }

            let deadline = tokio::time::Instant::now() + spacing;
            loop {
                let received = tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep_until(deadline) => break,
                    received = socket.recv_from(&mut buf) => received,
                };
                let received_ms = shared.clock().time_ms();
                let (len, from) = match received {
                    Ok(r) => r,
                    Err(e) => {
                        warn!("Clock client receive error: {}", e);
                        continue;
                    }
                };
                match SyncMessage::decode(&buf[..len]) {
                    Ok(SyncMessage::Time {
                        request_sent_ms,
                        master_ms,
                    }) => {
                        // Only replies to this interval's requests count.
                        if !outstanding.remove(&request_sent_ms) {
                            debug!(%from, request_sent_ms, "Ignoring stale clock reply");
                        } else if estimator
                            .add(request_sent_ms, master_ms, received_ms)
                            .is_none()
                        {
                            warn!(%from, request_sent_ms, received_ms, "Discarded clock reply with negative round trip");
                        }
                    }
                    Ok(other) => debug!(%from, ?other, "Clock client ignoring datagram"),
                    Err(e) => warn!(%from, "Ignoring datagram: {}", e),
                }
            }
        }

        outstanding.clear();
        let discarded = estimator.discarded();
        match estimator.take() {
            Some(best) => {
                shared.clock().adjust(best.offset_ms);
                info!(
                    offset_ms = best.offset_ms,
                    rtt_ms = best.rtt_ms,
                    discarded,
                    "Applied clock offset"
                );
            }
            None => warn!(discarded, "No usable clock reply this interval"),
        }
    }
}
