//! Frame I/O: write and timed read.
//!
//! Both directions go through `FrameFormat` so classic and FD framing share
//! one translation path. Transmit-busy and receive-empty are retryable and
//! always leave their sticky bit set.

use tracing::{debug, warn};

use crate::adapter::{AdapterError, MessageType, WireMessage};
use crate::error::{CanError, CanResult};
use crate::event::{Timeout, WaitOutcome};
use crate::table::{Channel, ChannelTable};
use crate::types::{
    CAN_MAX_LEN, CanMessage, CanStatus, FrameFormat, Handle, OpMode, dlc_to_len, len_to_dlc,
};

impl FrameFormat {
    /// Translate an outbound message into the adapter's wire shape.
    ///
    /// A remote frame carries the caller's DLC and no payload. A data frame's
    /// DLC must be the code for its payload length. FD payloads are
    /// zero-padded to the DLC length. ESI is receive-only and never
    /// transmitted.
    pub fn encode(self, msg: &CanMessage) -> CanResult<WireMessage> {
        let fd_frame = self.is_fd() && msg.fdf;
        let remote = msg.rtr && !fd_frame;
        let max = if fd_frame { self.max_payload() } else { CAN_MAX_LEN };
        let len = msg.data.len();
        if len > max {
            return Err(CanError::InvalidLength { len, max });
        }
        let max_dlc = len_to_dlc(max);
        if msg.dlc > max_dlc {
            return Err(CanError::InvalidLength {
                len: usize::from(msg.dlc),
                max: usize::from(max_dlc),
            });
        }
        if !remote && len_to_dlc(len) != msg.dlc {
            return Err(CanError::InvalidLength {
                len,
                max: dlc_to_len(msg.dlc),
            });
        }

        let mut msg_type = MessageType::STANDARD;
        msg_type.set(MessageType::EXTENDED, msg.xtd);
        msg_type.set(MessageType::RTR, remote);
        msg_type.set(MessageType::FD, fd_frame);
        msg_type.set(
            MessageType::BRS,
            fd_frame && msg.brs && self == FrameFormat::FdBrs,
        );

        let data = if remote {
            Vec::new()
        } else {
            let mut data = msg.data.clone();
            if fd_frame {
                data.resize(dlc_to_len(msg.dlc), 0);
            }
            data
        };
        Ok(WireMessage {
            id: msg.id,
            msg_type,
            dlc: msg.dlc,
            data,
            timestamp: Default::default(),
        })
    }

    /// Normalize an inbound data frame.
    pub fn decode(self, wire: &WireMessage) -> CanMessage {
        let fdf = self.is_fd() && wire.msg_type.contains(MessageType::FD);
        let rtr = wire.msg_type.contains(MessageType::RTR);
        let dlc = if fdf {
            wire.dlc & 0x0F
        } else {
            wire.dlc.min(CAN_MAX_LEN as u8)
        };
        let data = if rtr {
            Vec::new()
        } else {
            let mut data = wire.data.clone();
            data.resize(dlc_to_len(dlc), 0);
            data
        };
        CanMessage {
            id: wire.id,
            xtd: wire.msg_type.contains(MessageType::EXTENDED),
            rtr,
            fdf,
            brs: fdf && wire.msg_type.contains(MessageType::BRS),
            esi: fdf && wire.msg_type.contains(MessageType::ESI),
            sts: false,
            dlc,
            data,
            timestamp: wire.timestamp.to_timestamp(),
        }
    }
}

impl ChannelTable {
    /// Transmit one message.
    pub async fn write(&self, handle: Handle, msg: &CanMessage) -> CanResult<()> {
        let channel = self.channel(handle).await?;
        let mut ch = channel.lock().await;
        ch.ensure_online()?;
        let wire = ch.format.encode(msg)?;

        match self.adapter.write_frame(ch.board, ch.format.is_fd(), &wire).await {
            Ok(()) => {
                ch.status.transmitter_busy = false;
                Ok(())
            }
            Err(AdapterError::TransmitQueueFull | AdapterError::TransmitFull) => {
                debug!(handle = %handle, id = msg.id, "transmitter busy");
                ch.status.transmitter_busy = true;
                Err(CanError::TransmitBusy)
            }
            Err(e) => {
                warn!(handle = %handle, board = %ch.board, error = %e, "write failed");
                Err(e.into())
            }
        }
    }

    /// Receive one message, blocking up to `timeout` when the queue is empty.
    ///
    /// A status frame updates the sticky status and yields `ReceiveEmpty`,
    /// unless the channel reports error frames, in which case it is returned
    /// as a status message.
    pub async fn read(&self, handle: Handle, timeout: Timeout) -> CanResult<CanMessage> {
        let event = {
            let channel = self.channel(handle).await?;
            let mut ch = channel.lock().await;
            ch.ensure_online()?;
            match self.adapter.read_frame(ch.board, ch.format.is_fd()).await {
                Ok(wire) => return accept(&mut ch, wire),
                Err(AdapterError::ReceiveQueueEmpty) => {}
                Err(e) => return Err(e.into()),
            }
            if timeout.is_poll() {
                ch.status.receiver_empty = true;
                return Err(CanError::ReceiveEmpty);
            }
            ch.event.clone().ok_or(CanError::Fatal)?
        };

        if event.wait(timeout).await == WaitOutcome::Failed {
            return Err(CanError::Fatal);
        }

        // The slot may have been closed while waiting.
        let channel = self.channel(handle).await?;
        let mut ch = channel.lock().await;
        ch.ensure_online()?;
        match self.adapter.read_frame(ch.board, ch.format.is_fd()).await {
            Ok(wire) => accept(&mut ch, wire),
            Err(AdapterError::ReceiveQueueEmpty) => {
                ch.status.receiver_empty = true;
                Err(CanError::ReceiveEmpty)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Whether the channel on `handle` is started.
    pub async fn is_running(&self, handle: Handle) -> CanResult<bool> {
        let channel = self.channel(handle).await?;
        let running = channel.lock().await.is_running();
        Ok(running)
    }
}

fn accept(ch: &mut Channel, wire: WireMessage) -> CanResult<CanMessage> {
    if wire.is_status() {
        ch.status.merge(wire.bus_status());
        if !ch.mode.contains(OpMode::ERR) {
            return Err(CanError::ReceiveEmpty);
        }
        return Ok(status_message(ch.status, &wire));
    }
    ch.status.receiver_empty = false;
    Ok(ch.format.decode(&wire))
}

fn status_message(status: CanStatus, wire: &WireMessage) -> CanMessage {
    CanMessage {
        sts: true,
        dlc: 1,
        data: vec![status.to_byte()],
        timestamp: wire.timestamp.to_timestamp(),
        ..CanMessage::default()
    }
}
