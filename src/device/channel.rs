//! One bus channel of an opened device: frame transport and diagnostics.
//!
//! A [`Channel`] is a cheap handle (`Clone + Send + Sync`) so that one task
//! can transmit while another waits in [`Channel::receive`]. Only one receive
//! may be waiting at a time; a second concurrent call fails with
//! [`CanError::ReceiverBusy`] instead of racing the first one for frames.
//!
//! Waiting is implemented on top of the non-blocking driver: the queue is
//! polled every [`RECEIVE_POLL_INTERVAL`] and the poll loop is raced against
//! the channel stop signal and the caller's deadline.
use core::cell::Cell;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::signal::Signal;
use futures_util::future::{select, Either};
use futures_util::pin_mut;

use crate::device::config::{ChannelConfig, WorkMode};
use crate::device::info::ErrorInfo;
use crate::device::DeviceInner;
use crate::driver::Driver;
use crate::error::CanError;
use crate::transport::can_frame::CanFrame;
use crate::transport::traits::bus_timer::BusTimer;
use crate::transport::traits::can_bus::CanBus;
use crate::transport::{Timeout, RECEIVE_POLL_INTERVAL};

//==================================================================================CHANNEL_CORE
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ChannelState {
    Stopped,
    /// Reserved by a `start_channel` call that has not reached the driver yet.
    Starting,
    Started(ChannelConfig),
}

/// Per-channel state shared by every handle of that channel.
pub(crate) struct ChannelCore {
    state: Mutex<CriticalSectionRawMutex, Cell<ChannelState>>,
    /// Bumped on every start and stop, under the state lock.
    generation: AtomicU32,
    receiving: AtomicBool,
    stop: Signal<CriticalSectionRawMutex, ()>,
    errors: Mutex<CriticalSectionRawMutex, Cell<ErrorInfo>>,
}

impl ChannelCore {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(Cell::new(ChannelState::Stopped)),
            generation: AtomicU32::new(0),
            receiving: AtomicBool::new(false),
            stop: Signal::new(),
            errors: Mutex::new(Cell::new(ErrorInfo::default())),
        }
    }

    pub(crate) fn state(&self) -> ChannelState {
        self.state.lock(Cell::get)
    }

    pub(crate) fn config(&self) -> Option<ChannelConfig> {
        match self.state() {
            ChannelState::Started(config) => Some(config),
            _ => None,
        }
    }

    /// Generation of the current session, `None` unless started.
    pub(crate) fn session(&self) -> Option<u32> {
        self.state.lock(|state| {
            matches!(state.get(), ChannelState::Started(_))
                .then(|| self.generation.load(Ordering::Acquire))
        })
    }

    /// Whether the session `generation` has been stopped, possibly restarted since.
    pub(crate) fn ended(&self, generation: u32) -> bool {
        self.session() != Some(generation)
    }

    /// Resolves once the session `generation` has ended.
    ///
    /// A stop signal left over from an earlier session is consumed and ignored.
    async fn wait_ended(&self, generation: u32) {
        loop {
            self.stop.wait().await;
            if self.ended(generation) {
                return;
            }
        }
    }

    /// `Stopped -> Starting`; fails if the channel is not stopped.
    pub(crate) fn reserve(&self) -> bool {
        self.state.lock(|state| {
            if state.get() == ChannelState::Stopped {
                state.set(ChannelState::Starting);
                true
            } else {
                false
            }
        })
    }

    /// Finish a start: opens a new session and clears the error latch.
    pub(crate) fn started(&self, config: ChannelConfig) {
        self.errors.lock(|errors| errors.set(ErrorInfo::default()));
        self.state.lock(|state| {
            self.generation.fetch_add(1, Ordering::AcqRel);
            state.set(ChannelState::Started(config));
        });
    }

    pub(crate) fn release(&self) {
        self.state.lock(|state| state.set(ChannelState::Stopped));
    }

    /// `Started -> Stopped` and wake a waiting receive.
    ///
    /// Returns whether the channel was started.
    pub(crate) fn halt(&self) -> bool {
        let was_started = self.state.lock(|state| {
            let started = matches!(state.get(), ChannelState::Started(_));
            if started {
                self.generation.fetch_add(1, Ordering::AcqRel);
                state.set(ChannelState::Stopped);
            }
            started
        });
        if was_started {
            self.stop.signal(());
        }
        was_started
    }
}

/// Marks the channel as having a receive in progress for its lifetime.
struct ReceiveGuard<'a>(&'a AtomicBool);

impl<'a> ReceiveGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, CanError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| Self(flag))
            .map_err(|_| CanError::ReceiverBusy)
    }
}

impl Drop for ReceiveGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

//==================================================================================RECEIVED
/// Frames returned by one [`Channel::receive`] call, in arrival order.
///
/// Finite and not restartable: the frames were already removed from the
/// receive queue.
#[derive(Debug)]
pub struct Received {
    frames: std::vec::IntoIter<CanFrame>,
}

impl Received {
    fn new(frames: Vec<CanFrame>) -> Self {
        Self {
            frames: frames.into_iter(),
        }
    }
}

impl Iterator for Received {
    type Item = CanFrame;

    fn next(&mut self) -> Option<Self::Item> {
        self.frames.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.frames.size_hint()
    }
}

impl ExactSizeIterator for Received {}

enum WaitOutcome {
    Polled(Result<(), CanError>),
    Stopped,
    Expired,
}

//==================================================================================CHANNEL
/// Handle to one started channel of a [`Device`](crate::device::Device).
pub struct Channel<D: Driver, T: BusTimer> {
    device: Arc<DeviceInner<D, T>>,
    index: u8,
}

impl<D: Driver, T: BusTimer> Clone for Channel<D, T> {
    fn clone(&self) -> Self {
        Self {
            device: Arc::clone(&self.device),
            index: self.index,
        }
    }
}

impl<D: Driver, T: BusTimer> core::fmt::Debug for Channel<D, T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Channel")
            .field("handle", &self.device.handle)
            .field("index", &self.index)
            .field("state", &self.core().state())
            .finish()
    }
}

impl<D: Driver, T: BusTimer> Channel<D, T> {
    pub(crate) fn new(device: Arc<DeviceInner<D, T>>, index: u8) -> Self {
        Self { device, index }
    }

    fn core(&self) -> &ChannelCore {
        // `index` was checked against the channel count when the handle was built.
        &self.device.channels[self.index as usize]
    }

    /// Channel number on the device.
    pub fn index(&self) -> u8 {
        self.index
    }

    /// Configuration in force, `None` once the channel is stopped.
    pub fn config(&self) -> Option<ChannelConfig> {
        self.core().config()
    }

    pub fn is_started(&self) -> bool {
        self.config().is_some()
    }

    fn started_config(&self) -> Result<ChannelConfig, CanError> {
        self.config().ok_or(CanError::DeviceNotOpen)
    }

    //------------------------------------------------------------------------------SEND
    /// Hand one frame to the transmit queue.
    ///
    /// Returns once the frame is queued; delivery problems show up later in
    /// [`Channel::error_info`].
    pub fn send(&self, frame: &CanFrame) -> Result<(), CanError> {
        self.send_all(core::slice::from_ref(frame)).map(|_| ())
    }

    /// Queue a batch of frames and return how many the driver accepted.
    ///
    /// Fails with [`CanError::BufferFull`] only when none was accepted.
    pub fn send_all(&self, frames: &[CanFrame]) -> Result<usize, CanError> {
        let config = self.started_config()?;
        if config.mode == WorkMode::ListenOnly {
            return Err(CanError::ListenOnly);
        }
        if frames.is_empty() {
            return Ok(0);
        }

        let accepted = self
            .device
            .driver
            .transmit(self.device.handle, self.index, frames)?;
        if accepted == 0 {
            #[cfg(feature = "defmt")]
            defmt::warn!("Transmit queue full on channel {}", self.index);
            return Err(CanError::BufferFull);
        }
        Ok(accepted)
    }

    //------------------------------------------------------------------------------RECEIVE
    /// Take up to `max_frames` frames from the receive queue.
    ///
    /// - [`Timeout::Poll`] (`0`) returns at once, possibly with no frame.
    /// - [`Timeout::After`] waits for the first frame at most that long and
    ///   returns an empty sequence when it expires.
    /// - [`Timeout::Infinite`] (any negative value) waits until a frame
    ///   arrives; stopping the channel makes it return [`CanError::Cancelled`].
    pub async fn receive(
        &self,
        max_frames: usize,
        timeout: impl Into<Timeout>,
    ) -> Result<Received, CanError> {
        let timeout = timeout.into();
        let core = self.core();
        let session = core.session().ok_or(CanError::DeviceNotOpen)?;
        let _guard = ReceiveGuard::acquire(&core.receiving)?;

        let mut frames = Vec::new();
        if max_frames == 0 {
            return Ok(Received::new(frames));
        }
        self.fetch(&mut frames, max_frames)?;
        if !frames.is_empty() || timeout == Timeout::Poll {
            return Ok(Received::new(frames));
        }

        let outcome = {
            let wait = async {
                let poll = self.poll_frames(&mut frames, max_frames, session);
                let stop = core.wait_ended(session);
                pin_mut!(poll);
                pin_mut!(stop);
                match select(poll, stop).await {
                    Either::Left((result, _)) => WaitOutcome::Polled(result),
                    Either::Right(_) => WaitOutcome::Stopped,
                }
            };

            match timeout {
                Timeout::After(duration) => {
                    let deadline = self.device.timer.delay(duration);
                    pin_mut!(wait);
                    pin_mut!(deadline);
                    match select(wait, deadline).await {
                        Either::Left((outcome, _)) => outcome,
                        Either::Right(_) => WaitOutcome::Expired,
                    }
                }
                _ => wait.await,
            }
        };

        match outcome {
            WaitOutcome::Polled(result) => result.map(|_| Received::new(frames)),
            WaitOutcome::Expired => Ok(Received::new(frames)),
            WaitOutcome::Stopped => {
                #[cfg(feature = "defmt")]
                defmt::info!("Receive on channel {} cancelled by stop", self.index);
                Err(CanError::Cancelled)
            }
        }
    }

    /// Non-blocking driver read appending to `frames`.
    fn fetch(&self, frames: &mut Vec<CanFrame>, max_frames: usize) -> Result<usize, CanError> {
        let room = max_frames.saturating_sub(frames.len());
        self.device
            .driver
            .receive(self.device.handle, self.index, frames, room)
    }

    async fn poll_frames(
        &self,
        frames: &mut Vec<CanFrame>,
        max_frames: usize,
        session: u32,
    ) -> Result<(), CanError> {
        loop {
            self.device.timer.delay(RECEIVE_POLL_INTERVAL).await;
            if self.core().ended(session) {
                return Err(CanError::Cancelled);
            }
            if self.fetch(frames, max_frames)? > 0 {
                return Ok(());
            }
        }
    }

    /// Receive queue depth. Advisory: frames keep arriving concurrently.
    pub fn pending_count(&self) -> Result<usize, CanError> {
        self.started_config()?;
        self.device
            .driver
            .pending_count(self.device.handle, self.index)
    }

    /// Drop every queued frame not yet handed to a caller.
    pub fn clear_receive_buffer(&self) -> Result<(), CanError> {
        self.started_config()?;
        self.device
            .driver
            .clear_receive_buffer(self.device.handle, self.index)
    }

    //------------------------------------------------------------------------------DIAGNOSTICS
    fn latch_errors(&self) -> Result<ErrorInfo, CanError> {
        self.device.ensure_open()?;
        let snapshot = self
            .device
            .driver
            .error_info(self.device.handle, self.index)?;
        Ok(self.core().errors.lock(|latch| {
            let mut merged = latch.get();
            merged.merge(&snapshot);
            latch.set(merged);
            merged
        }))
    }

    /// Error conditions accumulated since the last [`Channel::take_error_info`].
    ///
    /// The latch is kept whatever the driver does with its own counters.
    pub fn error_info(&self) -> Result<ErrorInfo, CanError> {
        self.latch_errors()
    }

    /// Same as [`Channel::error_info`], then clear the latch.
    pub fn take_error_info(&self) -> Result<ErrorInfo, CanError> {
        let info = self.latch_errors()?;
        self.core()
            .errors
            .lock(|latch| latch.set(ErrorInfo::default()));
        Ok(info)
    }

    //------------------------------------------------------------------------------REGISTERS
    /// Raw controller register read starting at `address`.
    pub fn read_register(&self, address: u32, buf: &mut [u8]) -> Result<(), CanError> {
        self.device.ensure_open()?;
        self.device
            .driver
            .read_register(self.device.handle, self.index, address, buf)
    }

    /// Raw controller register write starting at `address`.
    pub fn write_register(&self, address: u32, data: &[u8]) -> Result<(), CanError> {
        self.device.ensure_open()?;
        self.device
            .driver
            .write_register(self.device.handle, self.index, address, data)
    }
}

//==================================================================================CAN_BUS
impl<D: Driver, T: BusTimer> CanBus for Channel<D, T> {
    type Error = CanError;

    fn send<'a>(
        &'a mut self,
        frame: &'a CanFrame,
    ) -> impl core::future::Future<Output = Result<(), Self::Error>> + 'a {
        let result = Channel::send(&*self, frame);
        async move { result }
    }

    fn recv<'a>(
        &'a mut self,
    ) -> impl core::future::Future<Output = Result<CanFrame, Self::Error>> + 'a {
        async move {
            self.receive(1, Timeout::Infinite)
                .await?
                .next()
                .ok_or(CanError::Cancelled)
        }
    }
}
