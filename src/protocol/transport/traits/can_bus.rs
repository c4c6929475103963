//! Minimal abstraction for a non-blocking CAN driver. Lets the node plug into
//! embedded HALs, desktop adapters or test doubles.
use crate::error::ChannelBusError;
use crate::protocol::transport::can_frame::CanFrame;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::{Receiver, Sender};

/// Contract to send and receive CAN frames without blocking.
pub trait CanBus {
    type Error: core::fmt::Debug;

    /// Bring the controller up. Called once, lazily, by the node.
    fn open(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Queue a frame for transmission. `wait_sent` asks the driver to keep
    /// frame order, which multi-frame messages rely on.
    fn send_frame(&mut self, frame: &CanFrame, wait_sent: bool) -> Result<(), Self::Error>;

    /// Next received frame, or `None` when nothing is pending.
    fn recv_frame(&mut self) -> Result<Option<CanFrame>, Self::Error>;
}

impl<B: CanBus + ?Sized> CanBus for &mut B {
    type Error = B::Error;

    fn open(&mut self) -> Result<(), Self::Error> {
        (**self).open()
    }

    fn send_frame(&mut self, frame: &CanFrame, wait_sent: bool) -> Result<(), Self::Error> {
        (**self).send_frame(frame, wait_sent)
    }

    fn recv_frame(&mut self) -> Result<Option<CanFrame>, Self::Error> {
        (**self).recv_frame()
    }
}

//==================================================================================CHANNEL_CAN_BUS
/// [`CanBus`] over two `embassy_sync` channels.
///
/// An interrupt handler or a driver task pushes received frames into the
/// receive channel and drains the transmit channel onto the wire, while the
/// node keeps exclusive ownership of its own state.
pub struct ChannelCanBus<'a, M: RawMutex, const RX: usize, const TX: usize> {
    rx: Receiver<'a, M, CanFrame, RX>,
    tx: Sender<'a, M, CanFrame, TX>,
}

impl<'a, M: RawMutex, const RX: usize, const TX: usize> ChannelCanBus<'a, M, RX, TX> {
    pub fn new(rx: Receiver<'a, M, CanFrame, RX>, tx: Sender<'a, M, CanFrame, TX>) -> Self {
        Self { rx, tx }
    }
}

impl<M: RawMutex, const RX: usize, const TX: usize> CanBus for ChannelCanBus<'_, M, RX, TX> {
    type Error = ChannelBusError;

    fn send_frame(&mut self, frame: &CanFrame, _wait_sent: bool) -> Result<(), Self::Error> {
        // Channels are FIFO, so ordering holds whatever `wait_sent` says.
        self.tx
            .try_send(frame.clone())
            .map_err(|_| ChannelBusError::TxQueueFull)
    }

    fn recv_frame(&mut self) -> Result<Option<CanFrame>, Self::Error> {
        Ok(self.rx.try_receive().ok())
    }
}
